//! Email tracking extraction
//!
//! Inbound emails are handed to an out-of-process inference task that reads
//! the message and calls back with structured tracking information. The wait
//! is bounded: the extractor polls the result backend and gives up after the
//! configured timeout. "Nothing found" and "gave up waiting" are both normal
//! outcomes, not errors.

use crate::domain::{TaskValue, TrackingInfo};
use crate::io::task_queue::{BrokerClient, BrokerError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

const EXTRACTION_TASK: &str = "run_chatgpt_assistant_prompt";

/// Task submission/result seam, implemented by the broker client
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn send_task(
        &self,
        name: &str,
        kwargs: &BTreeMap<String, TaskValue>,
    ) -> Result<Uuid, BrokerError>;
    async fn fetch_result(&self, task_id: Uuid) -> Result<Option<String>, BrokerError>;
}

#[async_trait]
impl TaskBackend for BrokerClient {
    async fn send_task(
        &self,
        name: &str,
        kwargs: &BTreeMap<String, TaskValue>,
    ) -> Result<Uuid, BrokerError> {
        BrokerClient::send_task(self, name, kwargs).await
    }

    async fn fetch_result(&self, task_id: Uuid) -> Result<Option<String>, BrokerError> {
        BrokerClient::fetch_result(self, task_id).await
    }
}

#[derive(Debug, Deserialize)]
struct TaskOutcome {
    status: String,
    #[serde(default)]
    result: Option<ExtractionResult>,
}

#[derive(Debug, Deserialize)]
struct ExtractionResult {
    #[serde(default)]
    functions: Vec<ExtractionFunction>,
}

#[derive(Debug, Deserialize)]
struct ExtractionFunction {
    #[serde(default)]
    arguments: ExtractionArguments,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionArguments {
    #[serde(default)]
    tracking_number: String,
    #[serde(default)]
    carrier: String,
    #[serde(default)]
    item_name: String,
}

pub struct EmailExtractor<B: TaskBackend> {
    backend: B,
    assistant_id: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl<B: TaskBackend> EmailExtractor<B> {
    pub fn new(backend: B, assistant_id: &str, timeout: Duration, poll_interval: Duration) -> Self {
        Self { backend, assistant_id: assistant_id.to_string(), timeout, poll_interval }
    }

    /// Extract tracking information from an email body.
    ///
    /// `Ok(None)` when the task finds nothing usable or does not finish in
    /// time.
    pub async fn detect_tracking(
        &self,
        email_body: &str,
    ) -> anyhow::Result<Option<Vec<TrackingInfo>>> {
        let mut kwargs = BTreeMap::new();
        kwargs.insert(
            "prompt".to_string(),
            TaskValue::Str(format!(
                "Get the tracking information from the email below:\n\n{email_body}"
            )),
        );
        kwargs.insert("assistant_id".to_string(), TaskValue::Str(self.assistant_id.clone()));

        let task_id = self.backend.send_task(EXTRACTION_TASK, &kwargs).await?;
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(raw) = self.backend.fetch_result(task_id).await? {
                let outcome: TaskOutcome = serde_json::from_str(&raw)?;
                match outcome.status.as_str() {
                    "SUCCESS" => return Ok(Self::collect(outcome.result)),
                    "FAILURE" => {
                        warn!(task_id = %task_id, "email_extraction_task_failed");
                        return Ok(None);
                    }
                    // PENDING/STARTED/RETRY: keep polling
                    _ => {}
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                info!(task_id = %task_id, timeout_secs = self.timeout.as_secs(), "email_extraction_timed_out");
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn collect(result: Option<ExtractionResult>) -> Option<Vec<TrackingInfo>> {
        let functions = result?.functions;
        let found: Vec<TrackingInfo> = functions
            .into_iter()
            .map(|f| f.arguments)
            .filter(|args| !args.tracking_number.is_empty())
            .map(|args| {
                let title = if args.item_name.is_empty() {
                    args.tracking_number.clone()
                } else {
                    args.item_name
                };
                TrackingInfo { carrier: args.carrier, tracking_number: args.tracking_number, title }
            })
            .collect();

        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Serves a fixed sequence of fetch_result replies.
    struct ScriptedBackend {
        replies: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Option<String>>) -> Self {
            Self { replies: Mutex::new(replies) }
        }
    }

    #[async_trait]
    impl TaskBackend for ScriptedBackend {
        async fn send_task(
            &self,
            _name: &str,
            _kwargs: &BTreeMap<String, TaskValue>,
        ) -> Result<Uuid, BrokerError> {
            Ok(Uuid::new_v4())
        }

        async fn fetch_result(&self, _task_id: Uuid) -> Result<Option<String>, BrokerError> {
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                Ok(None)
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    fn extractor(backend: ScriptedBackend) -> EmailExtractor<ScriptedBackend> {
        EmailExtractor::new(
            backend,
            "asst_test",
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
    }

    fn success_payload(functions: serde_json::Value) -> String {
        serde_json::json!({ "status": "SUCCESS", "result": { "functions": functions } })
            .to_string()
    }

    #[tokio::test]
    async fn test_extraction_hit_after_pending() {
        let backend = ScriptedBackend::new(vec![
            None,
            Some(serde_json::json!({ "status": "STARTED" }).to_string()),
            Some(success_payload(serde_json::json!([
                { "arguments": { "tracking_number": "1Z999", "item_name": "Headphones", "carrier": "ups" } },
                { "arguments": { "tracking_number": "", "item_name": "garbage" } },
                { "arguments": { "tracking_number": "RR123456789CN" } }
            ]))),
        ]);

        let found = extractor(backend).detect_tracking("your order shipped").await.unwrap();
        let found = found.unwrap();
        assert_eq!(found.len(), 2); // empty tracking number filtered
        assert_eq!(found[0].tracking_number, "1Z999");
        assert_eq!(found[0].title, "Headphones");
        assert_eq!(found[0].carrier, "ups");
        // Missing item name falls back to the tracking number
        assert_eq!(found[1].title, "RR123456789CN");
    }

    #[tokio::test]
    async fn test_no_functions_is_none() {
        let backend = ScriptedBackend::new(vec![Some(success_payload(serde_json::json!([])))]);
        let found = extractor(backend).detect_tracking("just a newsletter").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_none() {
        // Backend never produces a result
        let backend = ScriptedBackend::new(vec![]);
        let found = extractor(backend).detect_tracking("body").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_task_failure_is_none() {
        let backend = ScriptedBackend::new(vec![Some(
            serde_json::json!({ "status": "FAILURE" }).to_string(),
        )]);
        let found = extractor(backend).detect_tracking("body").await.unwrap();
        assert!(found.is_none());
    }
}
