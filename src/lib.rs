//! Shipment tracking webhook gateway
//!
//! Ingests tracking webhooks from two providers and an inbound email
//! channel, normalizes provider status vocabularies into a closed canonical
//! set, and fans out push notifications to the owning user's devices.
//!
//! Module structure:
//! - `domain/` - Core types (Shipment, Status vocabulary, TaskValue)
//! - `io/` - External interfaces (HTTP server, provider clients, push relay, task broker)
//! - `services/` - Business logic (webhook orchestration, cache, extraction, dispatch)
//! - `infra/` - Infrastructure (Config, Metrics, RecordStore)

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
