//! AfterShip tracking API client and webhook payload decoding
//!
//! AfterShip is the primary tracking provider: trackings are registered here
//! (with the owning user id stashed in `custom_fields`), queried for latest
//! updates and carrier detection, and pushed back at us via HMAC-signed
//! webhooks.

use crate::domain::{
    normalize_status, normalize_substatus, Carrier, Shipment, ShipmentUpdate,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Tagged decode failure for inbound provider payloads
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// A checkpoint as AfterShip reports it
#[derive(Debug, Clone, Deserialize)]
pub struct AsCheckpoint {
    #[serde(default)]
    pub message: String,
    pub tag: String,
    pub subtag: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country_region: Option<String>,
    #[serde(default)]
    pub coordinate: Option<AsCoordinate>,
    pub checkpoint_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsEstimatedDelivery {
    #[serde(default)]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

/// A tracking object as AfterShip reports it (webhook `msg` and API `data.tracking`)
#[derive(Debug, Clone, Deserialize)]
pub struct AsTracking {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub tracking_number: String,
    /// Carrier code ("usps", "fedex", ...)
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub checkpoints: Vec<AsCheckpoint>,
    #[serde(default)]
    pub custom_fields: Option<HashMap<String, String>>,
    #[serde(default)]
    pub courier_estimated_delivery_date: Option<AsEstimatedDelivery>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AsTracking {
    /// Owner user id embedded at tracking-creation time.
    ///
    /// Absence is a domain-level "no owner" condition, not a decode failure;
    /// the webhook handler drops such events instead of erroring.
    pub fn owner_user_id(&self) -> Option<Uuid> {
        self.custom_fields
            .as_ref()
            .and_then(|fields| fields.get("userId"))
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// Map into the canonical shipment shape, routing every status-like
    /// field through the normalizer.
    pub fn to_shipment(&self) -> Shipment {
        Shipment {
            id: self.id.clone(),
            title: self.title.clone().unwrap_or_else(|| self.tracking_number.clone()),
            tracking_number: self.tracking_number.clone(),
            carrier: self.slug.clone(),
            updates: self.checkpoints.iter().map(AsCheckpoint::to_update).collect(),
            delivery_date: self
                .courier_estimated_delivery_date
                .as_ref()
                .and_then(|d| d.estimated_delivery_date),
            timestamp: self.updated_at,
        }
    }
}

impl AsCheckpoint {
    fn to_update(&self) -> ShipmentUpdate {
        ShipmentUpdate {
            id: Uuid::new_v4(),
            title: self.message.clone(),
            comment: String::new(),
            status: normalize_status(&self.tag),
            substatus: normalize_substatus(&self.subtag),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            country: self.country_region.clone(),
            latitude: self.coordinate.as_ref().map(|c| c.latitude),
            longitude: self.coordinate.as_ref().map(|c| c.longitude),
            timestamp: self.checkpoint_time,
        }
    }
}

/// Webhook delivery envelope
#[derive(Debug, Deserialize)]
pub struct AsWebhookEvent {
    pub event: String,
    pub event_id: Uuid,
    #[serde(default)]
    pub is_tracking_first_tag: bool,
    pub msg: AsTracking,
    pub ts: i64,
}

/// Decode a raw webhook body. Pure; no IO.
pub fn decode_webhook(body: &[u8]) -> Result<AsWebhookEvent, DecodeError> {
    let event: AsWebhookEvent = serde_json::from_slice(body)?;
    if event.msg.tracking_number.is_empty() {
        return Err(DecodeError::MissingField("tracking_number"));
    }
    Ok(event)
}

#[derive(Debug, Deserialize)]
struct AsCourier {
    name: String,
    slug: String,
    #[serde(default)]
    other_name: Option<String>,
    #[serde(default)]
    web_url: Option<String>,
}

impl AsCourier {
    fn to_carrier(&self) -> Carrier {
        Carrier {
            name: self.name.clone(),
            code: self.slug.clone(),
            summary: self.other_name.clone().unwrap_or_else(|| self.name.clone()),
            url: self.web_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackingEnvelope {
    data: TrackingData,
}

#[derive(Debug, Deserialize)]
struct TrackingData {
    tracking: AsTracking,
}

#[derive(Debug, Deserialize)]
struct CouriersEnvelope {
    data: CouriersData,
}

#[derive(Debug, Deserialize)]
struct CouriersData {
    couriers: Vec<AsCourier>,
}

/// AfterShip REST client
pub struct AfterShipClient {
    api_base: String,
    api_key: String,
    http: reqwest::Client,
}

impl AfterShipClient {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { api_base: api_base.trim_end_matches('/').to_string(), api_key: api_key.to_string(), http }
    }

    /// Fetch a tracking by its AfterShip id. `Ok(None)` when unknown upstream.
    pub async fn get_tracking(&self, shipment_id: &str) -> anyhow::Result<Option<Shipment>> {
        let url = format!("{}/trackings/{}", self.api_base, shipment_id);
        let response = self
            .http
            .get(&url)
            .header("as-api-key", &self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let envelope: TrackingEnvelope = response.json().await?;
        Ok(Some(envelope.data.tracking.to_shipment()))
    }

    /// Register a new tracking, embedding the owner in `custom_fields`.
    pub async fn create_tracking(
        &self,
        tracking_number: &str,
        title: &str,
        custom_fields: &HashMap<String, String>,
    ) -> anyhow::Result<Option<Shipment>> {
        let url = format!("{}/trackings", self.api_base);
        let body = serde_json::json!({
            "tracking": {
                "tracking_number": tracking_number,
                "title": title,
                "custom_fields": custom_fields,
            }
        });

        let response = self
            .http
            .post(&url)
            .header("as-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                status = %response.status().as_u16(),
                tracking_number = %tracking_number,
                "aftership_create_tracking_failed"
            );
            return Ok(None);
        }
        let envelope: TrackingEnvelope = response.json().await?;
        Ok(Some(envelope.data.tracking.to_shipment()))
    }

    /// Detect possible carriers for a bare tracking number.
    pub async fn detect_carrier(&self, tracking_number: &str) -> anyhow::Result<Option<Vec<Carrier>>> {
        let url = format!("{}/couriers/detect", self.api_base);
        let body = serde_json::json!({
            "tracking": { "tracking_number": tracking_number }
        });

        let response = self
            .http
            .post(&url)
            .header("as-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                status = %response.status().as_u16(),
                tracking_number = %tracking_number,
                "aftership_detect_carrier_failed"
            );
            return Ok(None);
        }
        let envelope: CouriersEnvelope = response.json().await?;
        Ok(Some(envelope.data.couriers.iter().map(AsCourier::to_carrier).collect()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Status, Substatus};

    pub(crate) fn webhook_body(user_id: Option<&str>) -> Vec<u8> {
        let custom_fields = match user_id {
            Some(id) => serde_json::json!({ "userId": id }),
            None => serde_json::json!({}),
        };
        serde_json::json!({
            "event": "tracking_update",
            "event_id": "7a5f2a1e-4f7f-4c39-9df5-4d52a3f0b2aa",
            "is_tracking_first_tag": false,
            "msg": {
                "id": "ship-42",
                "title": "Mechanical keyboard",
                "tracking_number": "9400111899560000000000",
                "slug": "usps",
                "custom_fields": custom_fields,
                "checkpoints": [
                    {
                        "message": "Shipping label created",
                        "tag": "InfoReceived",
                        "subtag": "InfoReceived_001",
                        "checkpoint_time": "2025-06-01T08:00:00Z"
                    },
                    {
                        "message": "Delivered, front door",
                        "tag": "Delivered",
                        "subtag": "Delivered_003",
                        "city": "Portland",
                        "state": "OR",
                        "checkpoint_time": "2025-06-03T15:30:00Z"
                    }
                ]
            },
            "ts": 1748966400
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_decode_webhook_and_normalize() {
        let event =
            decode_webhook(&webhook_body(Some("b28e55a4-7e6c-4a3f-9c1e-2a57cb3f1d60"))).unwrap();
        let shipment = event.msg.to_shipment();

        assert_eq!(shipment.tracking_number, "9400111899560000000000");
        assert_eq!(shipment.carrier, "usps");
        assert_eq!(shipment.updates.len(), 2);

        let latest = shipment.latest_update().unwrap();
        assert_eq!(latest.status, Status::Delivered);
        assert_eq!(latest.substatus, Substatus::Delivered_003);
        assert_eq!(latest.city.as_deref(), Some("Portland"));
    }

    #[test]
    fn test_owner_user_id() {
        let with_owner =
            decode_webhook(&webhook_body(Some("b28e55a4-7e6c-4a3f-9c1e-2a57cb3f1d60"))).unwrap();
        assert!(with_owner.msg.owner_user_id().is_some());

        let without_owner = decode_webhook(&webhook_body(None)).unwrap();
        assert!(without_owner.msg.owner_user_id().is_none());
    }

    #[test]
    fn test_decode_webhook_malformed() {
        assert!(matches!(decode_webhook(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_webhook(b"{}"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_unmapped_tags_fall_back_to_unknown() {
        let body = serde_json::json!({
            "event": "tracking_update",
            "event_id": "7a5f2a1e-4f7f-4c39-9df5-4d52a3f0b2aa",
            "msg": {
                "id": "ship-43",
                "tracking_number": "XYZ",
                "checkpoints": [{
                    "tag": "SomethingNew",
                    "subtag": "SomethingNew_042",
                    "checkpoint_time": "2025-06-01T08:00:00Z"
                }]
            },
            "ts": 0
        })
        .to_string();

        let event = decode_webhook(body.as_bytes()).unwrap();
        let shipment = event.msg.to_shipment();
        assert_eq!(shipment.updates[0].status, Status::Unknown);
        assert_eq!(shipment.updates[0].substatus, Substatus::Unknown);
        // Missing title falls back to the tracking number
        assert_eq!(shipment.title, "XYZ");
    }
}
