//! 17track API client and webhook payload decoding
//!
//! 17track is the secondary provider. Its webhooks carry no signature and no
//! embedded owner, so ownership is resolved from our own records and
//! unresolvable deliveries are dropped with an accepted status to stop
//! redelivery.

use crate::domain::{normalize_status, normalize_substatus, Shipment, ShipmentUpdate};
use crate::io::aftership::DecodeError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct StLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coordinates: Option<StCoordinates>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single tracking event as 17track reports it
#[derive(Debug, Clone, Deserialize)]
pub struct StEvent {
    #[serde(default)]
    pub description: String,
    /// Coarse stage tag ("InTransit", "Delivered", ...)
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub sub_status: String,
    #[serde(default)]
    pub address: Option<StLocation>,
    pub time_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StProvider {
    #[serde(default)]
    pub events: Vec<StEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StTrackingBlock {
    #[serde(default)]
    pub providers: Vec<StProvider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StTimeMetrics {
    #[serde(default)]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StTrackInfo {
    #[serde(default)]
    pub tracking: Option<StTrackingBlock>,
    #[serde(default)]
    pub time_metrics: Option<StTimeMetrics>,
}

/// A tracking record as 17track reports it (webhook `data` and API `accepted` entry)
#[derive(Debug, Clone, Deserialize)]
pub struct StTracking {
    pub number: String,
    /// Numeric carrier code from the 17track carrier registry
    #[serde(default)]
    pub carrier: Option<i64>,
    pub track_info: StTrackInfo,
}

impl StTracking {
    /// Map into the canonical shipment shape. 17track has no provider-side
    /// shipment id, so the tracking number doubles as the id and ownership
    /// is resolved against our own records.
    pub fn to_shipment(&self) -> Shipment {
        let updates: Vec<ShipmentUpdate> = self
            .track_info
            .tracking
            .iter()
            .flat_map(|t| t.providers.iter())
            .flat_map(|p| p.events.iter())
            .map(StEvent::to_update)
            .collect();

        Shipment {
            id: self.number.clone(),
            title: self.number.clone(),
            tracking_number: self.number.clone(),
            carrier: self.carrier.map(|c| c.to_string()).unwrap_or_default(),
            updates,
            delivery_date: self
                .track_info
                .time_metrics
                .as_ref()
                .and_then(|m| m.estimated_delivery_date),
            timestamp: None,
        }
    }
}

impl StEvent {
    fn to_update(&self) -> ShipmentUpdate {
        let address = self.address.as_ref();
        ShipmentUpdate {
            id: Uuid::new_v4(),
            title: self.description.clone(),
            comment: String::new(),
            status: normalize_status(&self.stage),
            substatus: normalize_substatus(&self.sub_status),
            city: address.and_then(|a| a.city.clone()),
            state: address.and_then(|a| a.state.clone()),
            zip: address.and_then(|a| a.postal_code.clone()),
            country: address.and_then(|a| a.country.clone()),
            latitude: address.and_then(|a| a.coordinates.as_ref()).map(|c| c.latitude),
            longitude: address.and_then(|a| a.coordinates.as_ref()).map(|c| c.longitude),
            timestamp: self.time_utc,
        }
    }
}

/// Webhook delivery envelope
#[derive(Debug, Deserialize)]
pub struct StWebhookEvent {
    pub event: String,
    pub data: StTracking,
}

/// Decode a raw webhook body. Pure; no IO.
pub fn decode_webhook(body: &[u8]) -> Result<StWebhookEvent, DecodeError> {
    let event: StWebhookEvent = serde_json::from_slice(body)?;
    if event.data.number.is_empty() {
        return Err(DecodeError::MissingField("number"));
    }
    Ok(event)
}

#[derive(Debug, Deserialize)]
struct StApiEnvelope {
    data: StApiData,
}

#[derive(Debug, Deserialize)]
struct StApiData {
    #[serde(default)]
    accepted: Vec<StTracking>,
}

/// 17track REST client
pub struct SeventeenTrackClient {
    api_base: String,
    api_key: String,
    http: reqwest::Client,
}

impl SeventeenTrackClient {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { api_base: api_base.trim_end_matches('/').to_string(), api_key: api_key.to_string(), http }
    }

    /// Fetch current tracking state for a number. `Ok(None)` when 17track
    /// does not accept the number.
    pub async fn get_tracking(&self, tracking_number: &str) -> anyhow::Result<Option<Shipment>> {
        let url = format!("{}/gettrackinfo", self.api_base);
        let body = serde_json::json!([{ "number": tracking_number }]);

        let response = self
            .http
            .post(&url)
            .header("17token", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                status = %response.status().as_u16(),
                tracking_number = %tracking_number,
                "seventeen_track_get_tracking_failed"
            );
            return Ok(None);
        }
        let envelope: StApiEnvelope = response.json().await?;
        Ok(envelope.data.accepted.first().map(StTracking::to_shipment))
    }
}
