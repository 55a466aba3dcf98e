//! Lock-free metrics collection
//!
//! Counters use relaxed atomics; they are statistical only and must not be
//! used for coordination or logic decisions. Rendering reads a point-in-time
//! snapshot in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where a newly registered package came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    Email,
    Api,
}

impl PackageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageSource::Email => "email",
            PackageSource::Api => "api",
        }
    }
}

/// Which webhook provider an inbound delivery came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    AfterShip,
    SeventeenTrack,
    Mailgun,
}

impl WebhookProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProvider::AfterShip => "aftership",
            WebhookProvider::SeventeenTrack => "17track",
            WebhookProvider::Mailgun => "mailgun",
        }
    }
}

#[derive(Default)]
struct ProviderCounters {
    received: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

/// Application metrics collector
#[derive(Default)]
pub struct Metrics {
    notifications_sent: AtomicU64,
    packages_email: AtomicU64,
    packages_api: AtomicU64,
    aftership: ProviderCounters,
    seventeen_track: ProviderCounters,
    mailgun: ProviderCounters,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn provider(&self, provider: WebhookProvider) -> &ProviderCounters {
        match provider {
            WebhookProvider::AfterShip => &self.aftership,
            WebhookProvider::SeventeenTrack => &self.seventeen_track,
            WebhookProvider::Mailgun => &self.mailgun,
        }
    }

    pub fn record_notification_batch(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_package_added(&self, source: PackageSource) {
        match source {
            PackageSource::Email => self.packages_email.fetch_add(1, Ordering::Relaxed),
            PackageSource::Api => self.packages_api.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_webhook_received(&self, provider: WebhookProvider) {
        self.provider(provider).received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_rejected(&self, provider: WebhookProvider) {
        self.provider(provider).rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_dropped(&self, provider: WebhookProvider) {
        self.provider(provider).dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn packages_added(&self, source: PackageSource) -> u64 {
        match source {
            PackageSource::Email => self.packages_email.load(Ordering::Relaxed),
            PackageSource::Api => self.packages_api.load(Ordering::Relaxed),
        }
    }

    pub fn webhooks_received(&self, provider: WebhookProvider) -> u64 {
        self.provider(provider).received.load(Ordering::Relaxed)
    }

    pub fn webhooks_dropped(&self, provider: WebhookProvider) -> u64 {
        self.provider(provider).dropped.load(Ordering::Relaxed)
    }

    /// Render all counters in Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        write_counter_header(&mut output, "parcelgate_notifications_total", "Notification batches dispatched");
        let _ = writeln!(output, "parcelgate_notifications_total {}", self.notifications_sent());

        write_counter_header(&mut output, "parcelgate_packages_total", "Packages registered, by source");
        for source in [PackageSource::Email, PackageSource::Api] {
            let _ = writeln!(
                output,
                "parcelgate_packages_total{{source=\"{}\"}} {}",
                source.as_str(),
                self.packages_added(source)
            );
        }

        write_counter_header(&mut output, "parcelgate_webhooks_received_total", "Webhook deliveries received, by provider");
        write_counter_header(&mut output, "parcelgate_webhooks_rejected_total", "Webhook deliveries rejected, by provider");
        write_counter_header(&mut output, "parcelgate_webhooks_dropped_total", "Webhook deliveries accepted but dropped, by provider");
        for provider in [
            WebhookProvider::AfterShip,
            WebhookProvider::SeventeenTrack,
            WebhookProvider::Mailgun,
        ] {
            let counters = self.provider(provider);
            let name = provider.as_str();
            let _ = writeln!(
                output,
                "parcelgate_webhooks_received_total{{provider=\"{name}\"}} {}",
                counters.received.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                output,
                "parcelgate_webhooks_rejected_total{{provider=\"{name}\"}} {}",
                counters.rejected.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                output,
                "parcelgate_webhooks_dropped_total{{provider=\"{name}\"}} {}",
                counters.dropped.load(Ordering::Relaxed)
            );
        }

        output
    }
}

fn write_counter_header(output: &mut String, name: &str, help: &str) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
}
