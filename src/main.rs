//! parcelgate - shipment tracking webhook gateway
//!
//! Receives tracking webhooks (AfterShip, 17track) and inbound shipment
//! emails (Mailgun), normalizes provider statuses, and pushes notifications
//! to the owning user's devices.

use clap::Parser;
use parcelgate::infra::{Config, MemoryStore, Metrics, RecordStore};
use parcelgate::io::aftership::AfterShipClient;
use parcelgate::io::http::{start_server, AppState};
use parcelgate::io::push::PushRelayClient;
use parcelgate::io::seventeen_track::SeventeenTrackClient;
use parcelgate::io::task_queue::BrokerClient;
use parcelgate::services::cache::ResponseCache;
use parcelgate::services::{
    Dispatcher, EmailExtractor, ShipmentService, WebhookService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// parcelgate - shipment tracking webhook gateway
#[derive(Parser, Debug)]
#[command(name = "parcelgate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("parcelgate starting");

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    info!(
        config_file = %config.config_file(),
        bind = %config.bind(),
        port = %config.port(),
        aftership_api_base = %config.aftership_api_base(),
        seventeen_track_api_base = %config.seventeen_track_api_base(),
        broker_addr = %config.broker_addr(),
        extractor_timeout_secs = %config.extractor_timeout_secs(),
        "config_loaded"
    );
    // The 17track webhook contract ships without a signing header; that
    // route accepts unauthenticated payloads.
    warn!("seventeen_track_webhook_unsigned");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(ResponseCache::new());
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

    let aftership = Arc::new(AfterShipClient::new(
        config.aftership_api_base(),
        config.aftership_api_key(),
    ));
    let seventeen_track = Arc::new(SeventeenTrackClient::new(
        config.seventeen_track_api_base(),
        config.seventeen_track_api_key(),
    ));

    let push = Arc::new(PushRelayClient::new(
        config.push_development_endpoint(),
        config.push_production_endpoint(),
        config.push_api_key(),
        config.push_topic(),
        Duration::from_millis(config.push_timeout_ms()),
    ));
    let dispatcher = Arc::new(Dispatcher::new(push, metrics.clone()));

    let broker = BrokerClient::new(
        config.broker_addr(),
        config.broker_task_queue(),
        config.broker_result_prefix(),
    );
    let extractor = EmailExtractor::new(
        broker,
        config.extractor_assistant_id(),
        Duration::from_secs(config.extractor_timeout_secs()),
        Duration::from_millis(config.extractor_poll_interval_ms()),
    );

    let webhooks = WebhookService::new(
        store,
        dispatcher,
        metrics.clone(),
        extractor,
        aftership.clone(),
        seventeen_track,
        config.aftership_webhook_secret(),
    );
    let shipments = ShipmentService::new(
        aftership,
        cache,
        metrics.clone(),
        Duration::from_secs(config.latest_updates_ttl_secs()),
        Duration::from_secs(config.carrier_ttl_secs()),
    );

    let state = Arc::new(AppState {
        webhooks,
        shipments,
        metrics,
        user_token: config.user_token().to_string(),
        admin_token: config.admin_token().to_string(),
        metrics_token: config.metrics_token().to_string(),
        mailgun_max_body_bytes: config.mailgun_max_body_bytes(),
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    start_server(&config, state, shutdown_rx).await?;

    info!("parcelgate shutdown complete");
    Ok(())
}
