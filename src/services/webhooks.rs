//! Inbound webhook orchestration
//!
//! Every delivery walks the same path: verify, decode, resolve the owning
//! user, dispatch notifications, acknowledge. Failures split into rejections
//! (the provider did something wrong: 400/401) and drops (the delivery is
//! well-formed but nothing can be done with it). Drops return a success
//! status on purpose; an error status would put the provider into a
//! redelivery loop for events that can never succeed.

use crate::domain::{ReceivedShipment, Shipment, TrackingInfo, User};
use crate::infra::{Metrics, PackageSource, RecordStore, WebhookProvider};
use crate::io::aftership::{self, AfterShipClient};
use crate::io::seventeen_track::{self, SeventeenTrackClient};
use crate::services::dispatcher::Dispatcher;
use crate::services::email_extractor::{EmailExtractor, TaskBackend};
use crate::services::signature;
use chrono::Utc;
use hyper::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct WebhookService<B: TaskBackend> {
    store: Arc<dyn RecordStore>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    extractor: EmailExtractor<B>,
    aftership: Arc<AfterShipClient>,
    seventeen_track: Arc<SeventeenTrackClient>,
    aftership_secret: String,
}

impl<B: TaskBackend> WebhookService<B> {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        extractor: EmailExtractor<B>,
        aftership: Arc<AfterShipClient>,
        seventeen_track: Arc<SeventeenTrackClient>,
        aftership_secret: &str,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics,
            extractor,
            aftership,
            seventeen_track,
            aftership_secret: aftership_secret.to_string(),
        }
    }

    /// AfterShip delivery: HMAC-signed.
    pub async fn handle_aftership(&self, signature: Option<&str>, body: &[u8]) -> StatusCode {
        let provider = WebhookProvider::AfterShip;
        self.metrics.record_webhook_received(provider);

        let Some(signature) = signature else {
            warn!("aftership_webhook_missing_signature");
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::UNAUTHORIZED;
        };
        if !signature::verify(body, signature, &self.aftership_secret) {
            warn!("aftership_webhook_bad_signature");
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::UNAUTHORIZED;
        }
        if body.is_empty() {
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::BAD_REQUEST;
        }

        let event = match aftership::decode_webhook(body) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "aftership_webhook_decode_failed");
                self.metrics.record_webhook_rejected(provider);
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };

        let Some(owner) = event.msg.owner_user_id() else {
            info!(
                event_id = %event.event_id,
                tracking_number = %event.msg.tracking_number,
                "aftership_webhook_no_owner"
            );
            self.metrics.record_webhook_dropped(provider);
            return StatusCode::OK;
        };
        let Some(user) = self.store.find_user(owner).await else {
            info!(user_id = %owner, "aftership_webhook_unknown_user");
            self.metrics.record_webhook_dropped(provider);
            return StatusCode::OK;
        };

        let shipment = event.msg.to_shipment();
        match self.notify_latest(&user, &shipment, provider).await {
            Some(status) => status,
            None => StatusCode::OK,
        }
    }

    /// 17track delivery: the provider contract carries no signature, so the
    /// body is trusted as-is and ownership comes from our own records.
    pub async fn handle_seventeen_track(&self, body: &[u8]) -> StatusCode {
        let provider = WebhookProvider::SeventeenTrack;
        self.metrics.record_webhook_received(provider);

        if body.is_empty() {
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::BAD_REQUEST;
        }

        let event = match seventeen_track::decode_webhook(body) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "seventeen_track_webhook_decode_failed");
                self.metrics.record_webhook_rejected(provider);
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };

        let shipment = event.data.to_shipment();
        let Some(user) = self.store.find_user_by_shipment(&shipment.id).await else {
            info!(tracking_number = %shipment.tracking_number, "seventeen_track_webhook_no_owner");
            self.metrics.record_webhook_dropped(provider);
            return StatusCode::ACCEPTED;
        };

        match self.notify_latest(&user, &shipment, provider).await {
            Some(status) => status,
            None => StatusCode::ACCEPTED,
        }
    }

    /// Dispatch a notification for the newest checkpoint. Returns `None`
    /// when the shipment has no checkpoints (the caller picks the drop
    /// status, which differs per provider).
    async fn notify_latest(
        &self,
        user: &User,
        shipment: &Shipment,
        provider: WebhookProvider,
    ) -> Option<StatusCode> {
        let Some(latest) = shipment.latest_update() else {
            info!(
                shipment_id = %shipment.id,
                provider = %provider.as_str(),
                "webhook_no_checkpoints"
            );
            self.metrics.record_webhook_dropped(provider);
            return None;
        };

        let subtitle = format!("{} ({})", latest.status.as_str(), latest.substatus.as_str());
        let devices = self.store.devices_for(user.id).await;
        let delivered = self.dispatcher.dispatch(&shipment.title, &subtitle, &devices).await;

        info!(
            shipment_id = %shipment.id,
            provider = %provider.as_str(),
            status = %latest.status.as_str(),
            substatus = %latest.substatus.as_str(),
            devices = devices.len(),
            delivered,
            "webhook_dispatched"
        );
        Some(StatusCode::OK)
    }

    /// Mailgun inbound email. The HTTP layer has already parsed the form and
    /// enforced the body size cap.
    pub async fn handle_mailgun(&self, recipient: &str, plain_body: &str) -> StatusCode {
        let provider = WebhookProvider::Mailgun;
        self.metrics.record_webhook_received(provider);

        let Some(mailbox) = valid_mailbox(recipient) else {
            warn!(recipient = %recipient, "mailgun_webhook_bad_recipient");
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::BAD_REQUEST;
        };
        if plain_body.trim().is_empty() {
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::BAD_REQUEST;
        }

        let Some(user) = self.store.find_user_by_mailbox(mailbox).await else {
            info!(mailbox = %mailbox, "mailgun_webhook_unknown_mailbox");
            self.metrics.record_webhook_rejected(provider);
            return StatusCode::NOT_FOUND;
        };

        let found = match self.extractor.detect_tracking(plain_body).await {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, mailbox = %mailbox, "mailgun_extraction_failed");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };
        let Some(found) = found else {
            info!(mailbox = %mailbox, "mailgun_webhook_no_tracking_found");
            self.metrics.record_webhook_dropped(provider);
            return StatusCode::OK;
        };

        for info in found {
            if let Err(e) = self.register_from_email(&user, &info).await {
                error!(
                    error = %e,
                    tracking_number = %info.tracking_number,
                    "mailgun_tracking_registration_failed"
                );
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
        StatusCode::OK
    }

    async fn register_from_email(&self, user: &User, info: &TrackingInfo) -> anyhow::Result<()> {
        let mut custom_fields = HashMap::new();
        custom_fields.insert("userId".to_string(), user.id.to_string());

        let created = self
            .aftership
            .create_tracking(&info.tracking_number, &info.title, &custom_fields)
            .await?;

        if let Some(shipment) = created {
            self.store
                .record_shipment(
                    user.id,
                    ReceivedShipment {
                        shipment_id: shipment.id.clone(),
                        tracking_number: shipment.tracking_number.clone(),
                        received_at: Utc::now(),
                    },
                )
                .await;
            self.metrics.record_package_added(PackageSource::Email);
            info!(
                shipment_id = %shipment.id,
                tracking_number = %shipment.tracking_number,
                user_id = %user.id,
                "email_tracking_registered"
            );
        }
        Ok(())
    }

    /// Admin test path: re-send the notification for a shipment's newest
    /// checkpoint as if its provider had just delivered a webhook. For
    /// 17track the shipment id is the tracking number itself.
    pub async fn notify_existing(&self, provider: &str, shipment_id: &str) -> StatusCode {
        let Some(user) = self.store.find_user_by_shipment(shipment_id).await else {
            return StatusCode::NOT_FOUND;
        };

        let (provider, fetched) = match provider {
            "17track" => (
                WebhookProvider::SeventeenTrack,
                self.seventeen_track.get_tracking(shipment_id).await,
            ),
            _ => (WebhookProvider::AfterShip, self.aftership.get_tracking(shipment_id).await),
        };
        let shipment = match fetched {
            Ok(Some(shipment)) => shipment,
            Ok(None) => return StatusCode::NOT_FOUND,
            Err(e) => {
                error!(error = %e, shipment_id = %shipment_id, "notify_fetch_failed");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };

        match self.notify_latest(&user, &shipment, provider).await {
            Some(status) => status,
            None => StatusCode::OK,
        }
    }
}

/// Validate an inbound recipient address and return its mailbox (local
/// part). Accepts dot-atom local parts: atoms of `[A-Za-z0-9_+-]` separated
/// by single interior dots. Quoted-string forms are rejected; provisioned
/// mailboxes never use them.
fn valid_mailbox(recipient: &str) -> Option<&str> {
    let (local, domain) = recipient.split_once('@')?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return None;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return None;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
    {
        return None;
    }
    Some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PushEnvironment, TaskValue, UserDevice};
    use crate::infra::MemoryStore;
    use crate::io::push::{PushError, PushMessage, PushSender};
    use crate::io::task_queue::BrokerError;
    use crate::services::signature::hmac_sha256_base64;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use uuid::Uuid;

    struct RecordingSender {
        sent: Mutex<Vec<(String, PushMessage)>>,
    }

    #[async_trait]
    impl PushSender for RecordingSender {
        async fn send_alert(
            &self,
            device: &UserDevice,
            message: &PushMessage,
        ) -> Result<(), PushError> {
            self.sent.lock().push((device.device_id.clone(), message.clone()));
            Ok(())
        }
    }

    /// Task backend that always reports "nothing found".
    struct EmptyBackend;

    #[async_trait]
    impl TaskBackend for EmptyBackend {
        async fn send_task(
            &self,
            _name: &str,
            _kwargs: &BTreeMap<String, TaskValue>,
        ) -> Result<Uuid, BrokerError> {
            Ok(Uuid::new_v4())
        }

        async fn fetch_result(&self, _task_id: Uuid) -> Result<Option<String>, BrokerError> {
            Ok(Some(
                serde_json::json!({ "status": "SUCCESS", "result": { "functions": [] } })
                    .to_string(),
            ))
        }
    }

    const SECRET: &str = "test-webhook-secret";

    struct Harness {
        service: WebhookService<EmptyBackend>,
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        metrics: Arc<Metrics>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender { sent: Mutex::new(vec![]) });
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Arc::new(Dispatcher::new(sender.clone(), metrics.clone()));
        let extractor = EmailExtractor::new(
            EmptyBackend,
            "asst_test",
            Duration::from_millis(50),
            Duration::from_millis(5),
        );
        let aftership = Arc::new(AfterShipClient::new("http://127.0.0.1:9", "test-key"));
        let seventeen_track =
            Arc::new(SeventeenTrackClient::new("http://127.0.0.1:9", "test-key"));

        let service = WebhookService::new(
            store.clone(),
            dispatcher,
            metrics.clone(),
            extractor,
            aftership,
            seventeen_track,
            SECRET,
        );
        Harness { service, store, sender, metrics }
    }

    fn seed_user(store: &MemoryStore, id: Uuid, mailbox: &str) {
        store.insert_user(
            User { id, mailbox: mailbox.to_string() },
            vec![UserDevice {
                device_id: "tok-1".to_string(),
                environment: PushEnvironment::Production,
            }],
        );
    }

    #[tokio::test]
    async fn test_aftership_valid_signature_dispatches() {
        let h = harness();
        let user_id = Uuid::new_v4();
        seed_user(&h.store, user_id, "inbox-1");

        let body = crate::io::aftership::tests::webhook_body(Some(&user_id.to_string()));
        let sig = hmac_sha256_base64(&body, SECRET);

        let status = h.service.handle_aftership(Some(&sig), &body).await;
        assert_eq!(status, StatusCode::OK);

        let sent = h.sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.subtitle, "delivered (delivered_003)");
        assert_eq!(h.metrics.notifications_sent(), 1);
    }

    #[tokio::test]
    async fn test_aftership_invalid_signature_rejected() {
        let h = harness();
        let user_id = Uuid::new_v4();
        seed_user(&h.store, user_id, "inbox-1");

        let body = crate::io::aftership::tests::webhook_body(Some(&user_id.to_string()));

        let bad_sig = hmac_sha256_base64(&body, "wrong-secret");
        assert_eq!(h.service.handle_aftership(Some(&bad_sig), &body).await, StatusCode::UNAUTHORIZED);
        assert_eq!(h.service.handle_aftership(None, &body).await, StatusCode::UNAUTHORIZED);

        assert!(h.sender.sent.lock().is_empty());
        assert_eq!(h.metrics.notifications_sent(), 0);
    }

    #[tokio::test]
    async fn test_aftership_unknown_user_dropped_with_success() {
        let h = harness();
        // Owner id in the payload, but no such user in the store
        let body = crate::io::aftership::tests::webhook_body(Some(&Uuid::new_v4().to_string()));
        let sig = hmac_sha256_base64(&body, SECRET);

        assert_eq!(h.service.handle_aftership(Some(&sig), &body).await, StatusCode::OK);
        assert!(h.sender.sent.lock().is_empty());
        assert_eq!(h.metrics.webhooks_dropped(WebhookProvider::AfterShip), 1);
    }

    #[tokio::test]
    async fn test_seventeen_track_unsigned_but_owned() {
        let h = harness();
        let user_id = Uuid::new_v4();
        seed_user(&h.store, user_id, "inbox-1");
        h.store.insert_shipment_owner("RR123456789CN", user_id);

        let body = crate::io::seventeen_track::tests::webhook_body("RR123456789CN");
        assert_eq!(h.service.handle_seventeen_track(&body).await, StatusCode::OK);
        assert_eq!(h.sender.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_seventeen_track_no_owner_accepted_and_dropped() {
        let h = harness();
        let body = crate::io::seventeen_track::tests::webhook_body("RR000");
        assert_eq!(h.service.handle_seventeen_track(&body).await, StatusCode::ACCEPTED);
        assert!(h.sender.sent.lock().is_empty());
        assert_eq!(h.metrics.webhooks_dropped(WebhookProvider::SeventeenTrack), 1);
    }

    #[tokio::test]
    async fn test_seventeen_track_empty_body_rejected() {
        let h = harness();
        assert_eq!(h.service.handle_seventeen_track(b"").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mailgun_no_tracking_found_is_clean_200() {
        let h = harness();
        let user_id = Uuid::new_v4();
        seed_user(&h.store, user_id, "inbox-1");

        let status = h
            .service
            .handle_mailgun("inbox-1@parcels.example.com", "thanks for your order!")
            .await;
        assert_eq!(status, StatusCode::OK);

        // Nothing created, nothing counted
        assert!(h.store.received_shipments(user_id).is_empty());
        assert_eq!(h.metrics.packages_added(PackageSource::Email), 0);
        assert_eq!(h.metrics.webhooks_dropped(WebhookProvider::Mailgun), 1);
    }

    #[tokio::test]
    async fn test_mailgun_bad_recipient_and_unknown_mailbox() {
        let h = harness();
        assert_eq!(
            h.service.handle_mailgun("not-an-address", "body").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            h.service.handle_mailgun("who@parcels.example.com", "body").await,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_valid_mailbox() {
        assert_eq!(valid_mailbox("abc-123@parcels.example.com"), Some("abc-123"));
        assert_eq!(valid_mailbox("a b@parcels.example.com"), None);
        assert_eq!(valid_mailbox("abc@nodot"), None);
        assert_eq!(valid_mailbox("@parcels.example.com"), None);
        assert_eq!(valid_mailbox("plain"), None);
    }

    #[test]
    fn test_valid_mailbox_dot_atom_local_parts() {
        assert_eq!(valid_mailbox("john.doe@example.com"), Some("john.doe"));
        assert_eq!(valid_mailbox("john+orders@example.com"), Some("john+orders"));
        assert_eq!(valid_mailbox("a.b.c@example.com"), Some("a.b.c"));
        // Dots must be interior and single
        assert_eq!(valid_mailbox(".john@example.com"), None);
        assert_eq!(valid_mailbox("john.@example.com"), None);
        assert_eq!(valid_mailbox("jo..hn@example.com"), None);
    }
}
