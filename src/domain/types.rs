//! Shared types for the shipment gateway

use crate::domain::status::{Status, Substatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shipment being tracked, in the provider-agnostic shape served to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    pub title: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    pub carrier: String,
    /// Status updates as reported upstream. Not guaranteed to be sorted;
    /// consumers pick the update with the maximum timestamp as "latest".
    #[serde(default)]
    pub updates: Vec<ShipmentUpdate>,
    #[serde(rename = "deliveryDate", skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Shipment {
    /// Select the update with the maximum timestamp.
    ///
    /// Updates may arrive in any order, and multiple updates can share a
    /// timestamp; any maximal element is acceptable.
    pub fn latest_update(&self) -> Option<&ShipmentUpdate> {
        self.updates.iter().max_by_key(|u| u.timestamp)
    }
}

/// A single status update (checkpoint) in a shipment's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentUpdate {
    pub id: Uuid,
    pub title: String,
    pub comment: String,
    pub status: Status,
    pub substatus: Substatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A carrier handling a shipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    pub code: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Tracking information extracted from an inbound email
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingInfo {
    pub carrier: String,
    pub tracking_number: String,
    pub title: String,
}

/// Which push-delivery endpoint a device token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushEnvironment {
    Development,
    Production,
}

impl PushEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushEnvironment::Development => "development",
            PushEnvironment::Production => "production",
        }
    }
}

/// A registered device belonging to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDevice {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub environment: PushEnvironment,
}

/// A user as seen by the core: mailbox for email routing plus device tokens.
/// Owned by the record store; never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub mailbox: String,
}

/// Record of a shipment registered from an inbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedShipment {
    #[serde(rename = "shipmentId")]
    pub shipment_id: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,
}

/// Request body for registering a new tracking
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingRequest {
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    pub title: String,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::{normalize_status, normalize_substatus};
    use chrono::TimeZone;

    fn update_at(ts: DateTime<Utc>, title: &str) -> ShipmentUpdate {
        ShipmentUpdate {
            id: Uuid::new_v4(),
            title: title.to_string(),
            comment: String::new(),
            status: normalize_status("InTransit"),
            substatus: normalize_substatus("InTransit_002"),
            city: None,
            state: None,
            zip: None,
            country: None,
            latitude: None,
            longitude: None,
            timestamp: ts,
        }
    }

    fn shipment_with(updates: Vec<ShipmentUpdate>) -> Shipment {
        Shipment {
            id: "ship-1".to_string(),
            title: "Widget".to_string(),
            tracking_number: "1Z999".to_string(),
            carrier: "ups".to_string(),
            updates,
            delivery_date: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_latest_update_ignores_list_order() {
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).unwrap();

        // Deliberately out of order
        let shipment = shipment_with(vec![
            update_at(t2, "second"),
            update_at(t3, "third"),
            update_at(t1, "first"),
        ]);

        assert_eq!(shipment.latest_update().unwrap().title, "third");
    }

    #[test]
    fn test_latest_update_empty() {
        assert!(shipment_with(vec![]).latest_update().is_none());
    }

    #[test]
    fn test_latest_update_tied_timestamps_picks_a_maximal_element() {
        let t = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let shipment =
            shipment_with(vec![update_at(t, "a"), update_at(earlier, "old"), update_at(t, "b")]);

        let latest = shipment.latest_update().unwrap();
        assert_eq!(latest.timestamp, t);
        assert_ne!(latest.title, "old");
    }

    #[test]
    fn test_shipment_serializes_camel_case() {
        let shipment = shipment_with(vec![]);
        let json = serde_json::to_value(&shipment).unwrap();
        assert_eq!(json["trackingNumber"], "1Z999");
        assert!(json.get("deliveryDate").is_none());
    }
}
