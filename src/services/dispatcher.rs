//! Best-effort push notification fan-out
//!
//! One relay call per registered device. A failed token must not stop
//! delivery to the remaining tokens; failures are logged and skipped. The
//! notification counter counts dispatched batches, not individual tokens.

use crate::domain::UserDevice;
use crate::infra::Metrics;
use crate::io::push::{PushMessage, PushSender};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Dispatcher {
    sender: Arc<dyn PushSender>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn PushSender>, metrics: Arc<Metrics>) -> Self {
        Self { sender, metrics }
    }

    /// Deliver a notification to every device, returning how many deliveries
    /// succeeded. Sequential; cross-token ordering is not part of the
    /// contract.
    pub async fn dispatch(&self, title: &str, subtitle: &str, devices: &[UserDevice]) -> usize {
        if devices.is_empty() {
            return 0;
        }

        let message =
            PushMessage { title: title.to_string(), subtitle: subtitle.to_string() };
        let mut delivered = 0;

        for device in devices {
            match self.sender.send_alert(device, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        device_id = %device.device_id,
                        environment = %device.environment.as_str(),
                        error = %e,
                        "push_delivery_failed"
                    );
                }
            }
        }

        self.metrics.record_notification_batch();
        info!(devices = devices.len(), delivered, "notification_batch_dispatched");
        delivered
    }
}
