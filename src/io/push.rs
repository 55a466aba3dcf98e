//! Push notification relay client
//!
//! Notifications go out through an HTTP relay with separate endpoints for
//! development and production device registrations. The trait seam exists so
//! the dispatcher can be exercised without a live relay.

use crate::domain::{PushEnvironment, UserDevice};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push relay transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push relay returned {status} for device {device_id}")]
    Rejected { status: u16, device_id: String },
}

/// Notification content delivered to a single device
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub subtitle: String,
}

/// Outbound push delivery seam
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_alert(&self, device: &UserDevice, message: &PushMessage)
        -> Result<(), PushError>;
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    device_id: &'a str,
    topic: &'a str,
    title: &'a str,
    subtitle: &'a str,
}

/// HTTP relay implementation of [`PushSender`]
pub struct PushRelayClient {
    development_endpoint: String,
    production_endpoint: String,
    api_key: String,
    topic: String,
    http: reqwest::Client,
}

impl PushRelayClient {
    pub fn new(
        development_endpoint: &str,
        production_endpoint: &str,
        api_key: &str,
        topic: &str,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            development_endpoint: development_endpoint.to_string(),
            production_endpoint: production_endpoint.to_string(),
            api_key: api_key.to_string(),
            topic: topic.to_string(),
            http,
        }
    }

    fn endpoint_for(&self, environment: PushEnvironment) -> &str {
        match environment {
            PushEnvironment::Development => &self.development_endpoint,
            PushEnvironment::Production => &self.production_endpoint,
        }
    }
}

#[async_trait]
impl PushSender for PushRelayClient {
    async fn send_alert(
        &self,
        device: &UserDevice,
        message: &PushMessage,
    ) -> Result<(), PushError> {
        let request = RelayRequest {
            device_id: &device.device_id,
            topic: &self.topic,
            title: &message.title,
            subtitle: &message.subtitle,
        };

        let response = self
            .http
            .post(self.endpoint_for(device.environment))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PushError::Rejected {
                status: response.status().as_u16(),
                device_id: device.device_id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection_by_environment() {
        let client = PushRelayClient::new(
            "http://localhost:9100/push",
            "http://localhost:9101/push",
            "key",
            "com.example.app",
            Duration::from_secs(5),
        );
        assert_eq!(
            client.endpoint_for(PushEnvironment::Development),
            "http://localhost:9100/push"
        );
        assert_eq!(
            client.endpoint_for(PushEnvironment::Production),
            "http://localhost:9101/push"
        );
    }
}
