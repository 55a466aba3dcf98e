//! Tracking query surface
//!
//! Read paths are cached: latest-update queries for 5 minutes (but only when
//! the provider actually has checkpoints), carrier detection for 10 seconds.
//! Writes (new trackings) go straight upstream and bump the api-source
//! package counter.

use crate::domain::{Shipment, TrackingRequest};
use crate::infra::{Metrics, PackageSource};
use crate::io::aftership::AfterShipClient;
use crate::services::cache::ResponseCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn latest_updates_key(shipment_id: &str) -> String {
    format!("getLatestTrackingUpdates.{shipment_id}")
}

fn carrier_key(tracking_number: &str) -> String {
    format!("detectCarrierForTracking.{tracking_number}")
}

fn has_updates(value: &serde_json::Value) -> bool {
    value
        .get("updates")
        .and_then(|u| u.as_array())
        .map(|a| !a.is_empty())
        .unwrap_or(false)
}

pub struct ShipmentService {
    aftership: Arc<AfterShipClient>,
    cache: Arc<ResponseCache>,
    metrics: Arc<Metrics>,
    latest_updates_ttl: Duration,
    carrier_ttl: Duration,
}

impl ShipmentService {
    pub fn new(
        aftership: Arc<AfterShipClient>,
        cache: Arc<ResponseCache>,
        metrics: Arc<Metrics>,
        latest_updates_ttl: Duration,
        carrier_ttl: Duration,
    ) -> Self {
        Self { aftership, cache, metrics, latest_updates_ttl, carrier_ttl }
    }

    /// Current state of a tracked shipment, served from cache when fresh.
    ///
    /// Responses with no checkpoints yet are never cached; a freshly created
    /// tracking would otherwise serve "no updates" for a full TTL after the
    /// first checkpoint lands.
    pub async fn latest_updates(
        &self,
        shipment_id: &str,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let value = self
            .cache
            .get_or_compute(
                &latest_updates_key(shipment_id),
                self.latest_updates_ttl,
                has_updates,
                || async {
                    match self.aftership.get_tracking(shipment_id).await? {
                        Some(shipment) => Ok::<_, anyhow::Error>(serde_json::to_value(&shipment)?),
                        None => Ok(serde_json::Value::Null),
                    }
                },
            )
            .await?;

        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Carrier candidates for a bare tracking number, cached briefly.
    pub async fn detect_carrier(
        &self,
        tracking_number: &str,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let value = self
            .cache
            .get_or_compute(
                &carrier_key(tracking_number),
                self.carrier_ttl,
                serde_json::Value::is_array,
                || async {
                    match self.aftership.detect_carrier(tracking_number).await? {
                        Some(carriers) => Ok::<_, anyhow::Error>(serde_json::to_value(&carriers)?),
                        None => Ok(serde_json::Value::Null),
                    }
                },
            )
            .await?;

        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Register a new tracking upstream on behalf of a user.
    pub async fn start_tracking(
        &self,
        request: &TrackingRequest,
    ) -> anyhow::Result<Option<Shipment>> {
        let mut custom_fields = HashMap::new();
        custom_fields.insert("userId".to_string(), request.user_id.to_string());

        let created = self
            .aftership
            .create_tracking(&request.tracking_number, &request.title, &custom_fields)
            .await?;

        if let Some(shipment) = &created {
            self.metrics.record_package_added(PackageSource::Api);
            info!(
                shipment_id = %shipment.id,
                tracking_number = %shipment.tracking_number,
                user_id = %request.user_id,
                "tracking_registered"
            );
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_shapes() {
        assert_eq!(latest_updates_key("ship-1"), "getLatestTrackingUpdates.ship-1");
        assert_eq!(carrier_key("1Z999"), "detectCarrierForTracking.1Z999");
    }

    #[test]
    fn test_has_updates_predicate() {
        assert!(has_updates(&serde_json::json!({ "updates": [{ "title": "x" }] })));
        assert!(!has_updates(&serde_json::json!({ "updates": [] })));
        assert!(!has_updates(&serde_json::json!({})));
        assert!(!has_updates(&serde_json::Value::Null));
    }
}
