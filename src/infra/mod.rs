//! Infrastructure: configuration, metrics, record store

pub mod config;
pub mod metrics;
pub mod store;

pub use config::Config;
pub use metrics::{Metrics, PackageSource, WebhookProvider};
pub use store::{MemoryStore, RecordStore};
