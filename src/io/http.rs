//! HTTP surface: webhook ingestion, tracking API, metrics
//!
//! Hand-routed on hyper. Each accepted connection is served on its own task;
//! shutdown is signalled through a watch channel.

use crate::infra::{Config, Metrics};
use crate::services::email_extractor::TaskBackend;
use crate::services::shipments::ShipmentService;
use crate::services::webhooks::WebhookService;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SIGNATURE_HEADER: &str = "aftership-hmac-sha256";

/// Cap on JSON request bodies (webhooks, tracking API). Inbound email gets
/// its own configurable cap.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Everything a request handler can reach
pub struct AppState<B: TaskBackend> {
    pub webhooks: WebhookService<B>,
    pub shipments: ShipmentService,
    pub metrics: Arc<Metrics>,
    pub user_token: String,
    pub admin_token: String,
    pub metrics_token: String,
    pub mailgun_max_body_bytes: usize,
}

fn response(status: StatusCode, body: Bytes, content_type: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(body))
        .expect("static response should not fail")
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail")
}

fn json(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    response(status, Bytes::from(value.to_string()), "application/json")
}

/// Extract the bearer token from an Authorization header value.
fn bearer_token<T>(req: &Request<T>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authorized<T>(req: &Request<T>, expected: &str) -> bool {
    bearer_token(req).map(|t| t == expected).unwrap_or(false)
}

/// Parse an application/x-www-form-urlencoded body into a map.
fn parse_form(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn query_param<T>(req: &Request<T>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Collect a request body under `limit` bytes. Oversized bodies map to 413,
/// anything else unreadable to 400.
async fn read_body<I>(req: Request<I>, limit: usize) -> Result<Bytes, StatusCode>
where
    I: Body,
    I::Error: std::error::Error + Send + Sync + 'static,
{
    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit, "request_body_too_large");
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e) => {
            warn!(error = %e, "request_body_read_failed");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

async fn handle_request<B, I>(
    req: Request<I>,
    state: Arc<AppState<B>>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: TaskBackend,
    I: Body,
    I::Error: std::error::Error + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<String> =
        path.trim_matches('/').split('/').map(str::to_string).collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::POST, ["webhooks", "aftership"]) => {
            let signature = req
                .headers()
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = match read_body(req, JSON_BODY_LIMIT).await {
                Ok(body) => body,
                Err(status) => return Ok(empty(status)),
            };
            empty(state.webhooks.handle_aftership(signature.as_deref(), &body).await)
        }
        (&Method::POST, ["webhooks", "17track"]) => {
            let body = match read_body(req, JSON_BODY_LIMIT).await {
                Ok(body) => body,
                Err(status) => return Ok(empty(status)),
            };
            empty(state.webhooks.handle_seventeen_track(&body).await)
        }
        (&Method::POST, ["webhooks", "mailgun"]) => {
            let body = match read_body(req, state.mailgun_max_body_bytes).await {
                Ok(body) => body,
                Err(status) => return Ok(empty(status)),
            };
            let form = parse_form(&body);
            let (Some(recipient), Some(plain)) = (form.get("recipient"), form.get("body-plain"))
            else {
                return Ok(empty(StatusCode::BAD_REQUEST));
            };
            empty(state.webhooks.handle_mailgun(recipient, plain).await)
        }
        (&Method::POST, ["webhooks", provider, "notify"]) => {
            if !authorized(&req, &state.admin_token) {
                return Ok(empty(StatusCode::UNAUTHORIZED));
            }
            let provider = provider.to_string();
            let body = match read_body(req, JSON_BODY_LIMIT).await {
                Ok(body) => body,
                Err(status) => return Ok(empty(status)),
            };
            let Ok(request) = serde_json::from_slice::<serde_json::Value>(&body) else {
                return Ok(empty(StatusCode::BAD_REQUEST));
            };
            let Some(shipment_id) = request.get("shipmentId").and_then(|v| v.as_str()) else {
                return Ok(empty(StatusCode::BAD_REQUEST));
            };
            empty(state.webhooks.notify_existing(&provider, shipment_id).await)
        }
        (&Method::POST, ["tracking"]) => {
            if !authorized(&req, &state.user_token) {
                return Ok(empty(StatusCode::UNAUTHORIZED));
            }
            let body = match read_body(req, JSON_BODY_LIMIT).await {
                Ok(body) => body,
                Err(status) => return Ok(empty(status)),
            };
            let request = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "tracking_request_malformed");
                    return Ok(empty(StatusCode::BAD_REQUEST));
                }
            };
            match state.shipments.start_tracking(&request).await {
                Ok(Some(shipment)) => match serde_json::to_value(&shipment) {
                    Ok(value) => json(StatusCode::OK, &value),
                    Err(_) => empty(StatusCode::INTERNAL_SERVER_ERROR),
                },
                Ok(None) => empty(StatusCode::INTERNAL_SERVER_ERROR),
                Err(e) => {
                    error!(error = %e, "start_tracking_failed");
                    empty(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
        (&Method::GET, ["tracking", "carrier"]) => {
            if !authorized(&req, &state.user_token) {
                return Ok(empty(StatusCode::UNAUTHORIZED));
            }
            let Some(tracking_number) = query_param(&req, "trackingNumber") else {
                return Ok(empty(StatusCode::BAD_REQUEST));
            };
            match state.shipments.detect_carrier(&tracking_number).await {
                Ok(Some(carriers)) => json(StatusCode::OK, &carriers),
                Ok(None) => empty(StatusCode::INTERNAL_SERVER_ERROR),
                Err(e) => {
                    error!(error = %e, tracking_number = %tracking_number, "detect_carrier_failed");
                    empty(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
        (&Method::GET, ["tracking", shipment_id]) => {
            if !authorized(&req, &state.user_token) {
                return Ok(empty(StatusCode::UNAUTHORIZED));
            }
            match state.shipments.latest_updates(shipment_id).await {
                Ok(Some(shipment)) => json(StatusCode::OK, &shipment),
                Ok(None) => empty(StatusCode::NOT_FOUND),
                Err(e) => {
                    error!(error = %e, shipment_id = %shipment_id, "latest_updates_failed");
                    empty(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
        (&Method::GET, ["metrics"]) => {
            if !authorized(&req, &state.metrics_token) {
                return Ok(empty(StatusCode::UNAUTHORIZED));
            }
            response(
                StatusCode::OK,
                Bytes::from(state.metrics.render_prometheus()),
                "text/plain; version=0.0.4; charset=utf-8",
            )
        }
        (&Method::GET, ["health"]) => response(StatusCode::OK, Bytes::from("ok"), "text/plain"),
        _ => empty(StatusCode::NOT_FOUND),
    };

    Ok(response)
}

/// Run the HTTP server until shutdown is signalled.
pub async fn start_server<B: TaskBackend + 'static>(
    config: &Config,
    state: Arc<AppState<B>>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.port()).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        let io = TokioIo::new(stream);

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
