//! Task broker client
//!
//! Background work (email inference) runs out of process behind a task
//! broker speaking RESP. Submission is a `PUBLISH <queue> <message>` with a
//! Celery-compatible JSON message; results land under string keys polled
//! with `GET <result_prefix><task_id>`.
//!
//! One TCP connection, held behind a mutex. Request/reply traffic is low
//! volume, so serializing round-trips is simpler than a connection pool;
//! any IO error drops the connection and the next call redials.

use crate::domain::TaskValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BytesMut};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Log connection failure (cold path)
#[cold]
fn log_connect_failed(e: &std::io::Error) {
    error!(error = %e, "broker_connect_failed");
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker io: {0}")]
    Io(#[from] std::io::Error),
    #[error("broker timeout during {0}")]
    Timeout(&'static str),
    #[error("broker protocol: {0}")]
    Protocol(String),
    #[error("broker error reply: {0}")]
    Server(String),
}

/// A single RESP reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
}

/// Encode a command as a RESP array of bulk strings.
fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse one reply from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds an incomplete reply and more
/// bytes are needed.
fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>, BrokerError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    // A CRLF at offset zero leaves no room for the type byte.
    if line_end == 0 {
        return Err(BrokerError::Protocol("empty reply line".to_string()));
    }
    let line = std::str::from_utf8(&buf[1..line_end])
        .map_err(|_| BrokerError::Protocol("non-utf8 reply line".to_string()))?;
    let consumed = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((Reply::Simple(line.to_string()), consumed))),
        b'-' => Ok(Some((Reply::Error(line.to_string()), consumed))),
        b':' => {
            let n: i64 = line
                .parse()
                .map_err(|_| BrokerError::Protocol(format!("bad integer reply: {line}")))?;
            Ok(Some((Reply::Integer(n), consumed)))
        }
        b'$' => {
            let len: i64 = line
                .parse()
                .map_err(|_| BrokerError::Protocol(format!("bad bulk length: {line}")))?;
            if len < 0 {
                return Ok(Some((Reply::Nil, consumed)));
            }
            let len = len as usize;
            let total = consumed + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            if &buf[consumed + len..total] != b"\r\n" {
                return Err(BrokerError::Protocol("bulk string missing terminator".to_string()));
            }
            Ok(Some((Reply::Bulk(buf[consumed..consumed + len].to_vec()), total)))
        }
        other => Err(BrokerError::Protocol(format!("unexpected reply type byte 0x{other:02x}"))),
    }
}

/// Human-readable kwargs rendering for the message headers.
fn kwargs_repr(kwargs: &BTreeMap<String, TaskValue>) -> String {
    let pairs: Vec<String> =
        kwargs.iter().map(|(k, v)| format!("{k:?}: {}", v.repr())).collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Build the Celery-compatible message published for one task submission.
fn build_task_message(
    name: &str,
    task_id: &str,
    queue: &str,
    origin: &str,
    kwargs: &BTreeMap<String, TaskValue>,
) -> serde_json::Value {
    let body = serde_json::json!([
        [],
        kwargs,
        { "callbacks": null, "errbacks": null, "chain": null, "chord": null }
    ]);
    let body_b64 = BASE64.encode(body.to_string());

    serde_json::json!({
        "body": body_b64,
        "content-encoding": "utf-8",
        "content-type": "application/json",
        "headers": {
            "lang": "py",
            "task": name,
            "id": task_id,
            "root_id": task_id,
            "parent_id": null,
            "group": null,
            "argsrepr": "()",
            "kwargsrepr": kwargs_repr(kwargs),
            "origin": origin,
        },
        "properties": {
            "correlation_id": task_id,
            "reply_to": Uuid::new_v4().to_string(),
            "delivery_mode": 2,
            "delivery_info": { "exchange": "", "routing_key": queue },
            "priority": 0,
            "body_encoding": "base64",
            "delivery_tag": Uuid::new_v4().to_string(),
        }
    })
}

pub struct BrokerClient {
    addr: String,
    queue: String,
    result_prefix: String,
    origin: String,
    dial_timeout: Duration,
    io_timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl BrokerClient {
    pub fn new(addr: &str, queue: &str, result_prefix: &str) -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self {
            addr: addr.to_string(),
            queue: queue.to_string(),
            result_prefix: result_prefix.to_string(),
            origin: format!("parcelgate@{host}"),
            dial_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<TcpStream, BrokerError> {
        info!(addr = %self.addr, "broker_connecting");
        let stream = tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| BrokerError::Timeout("connect"))?
            .map_err(|e| {
                log_connect_failed(&e);
                BrokerError::Io(e)
            })?;
        stream.set_nodelay(true)?;
        info!(addr = %self.addr, "broker_connected");
        Ok(stream)
    }

    /// One command round-trip on the shared connection. The connection is
    /// dropped on any failure so the next call starts clean.
    async fn roundtrip(&self, args: &[&[u8]]) -> Result<Reply, BrokerError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        // Checked above.
        let Some(stream) = guard.as_mut() else {
            return Err(BrokerError::Protocol("connection missing".to_string()));
        };

        let result = Self::roundtrip_on(stream, args, self.io_timeout).await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn roundtrip_on(
        stream: &mut TcpStream,
        args: &[&[u8]],
        io_timeout: Duration,
    ) -> Result<Reply, BrokerError> {
        let command = encode_command(args);
        tokio::time::timeout(io_timeout, stream.write_all(&command))
            .await
            .map_err(|_| BrokerError::Timeout("write"))??;

        let mut acc = BytesMut::with_capacity(4096);
        let mut buf = [0u8; 4096];
        loop {
            if let Some((reply, consumed)) = parse_reply(&acc)? {
                acc.advance(consumed);
                return match reply {
                    Reply::Error(message) => Err(BrokerError::Server(message)),
                    other => Ok(other),
                };
            }

            let n = tokio::time::timeout(io_timeout, stream.read(&mut buf))
                .await
                .map_err(|_| BrokerError::Timeout("read"))??;
            if n == 0 {
                return Err(BrokerError::Protocol("connection closed mid-reply".to_string()));
            }
            acc.extend_from_slice(&buf[..n]);
        }
    }

    /// Submit a named task with keyword arguments. Returns the task id used
    /// for result polling.
    pub async fn send_task(
        &self,
        name: &str,
        kwargs: &BTreeMap<String, TaskValue>,
    ) -> Result<Uuid, BrokerError> {
        let task_id = Uuid::new_v4();
        let message =
            build_task_message(name, &task_id.to_string(), &self.queue, &self.origin, kwargs)
                .to_string();

        let reply = self
            .roundtrip(&[b"PUBLISH", self.queue.as_bytes(), message.as_bytes()])
            .await?;
        match reply {
            Reply::Integer(subscribers) => {
                debug!(task = %name, task_id = %task_id, subscribers, "broker_task_published");
                Ok(task_id)
            }
            other => Err(BrokerError::Protocol(format!("unexpected PUBLISH reply: {other:?}"))),
        }
    }

    /// Poll for a task result. `Ok(None)` while the task has not finished.
    pub async fn fetch_result(&self, task_id: Uuid) -> Result<Option<String>, BrokerError> {
        let key = format!("{}{}", self.result_prefix, task_id);
        let reply = self.roundtrip(&[b"GET", key.as_bytes()]).await?;
        match reply {
            Reply::Nil => Ok(None),
            Reply::Bulk(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| BrokerError::Protocol("non-utf8 result payload".to_string()))?;
                Ok(Some(text))
            }
            other => Err(BrokerError::Protocol(format!("unexpected GET reply: {other:?}"))),
        }
    }
}
