//! Business logic: signature verification, caching, extraction, dispatch,
//! webhook orchestration, tracking queries

pub mod cache;
pub mod dispatcher;
pub mod email_extractor;
pub mod shipments;
pub mod signature;
pub mod webhooks;

pub use cache::ResponseCache;
pub use dispatcher::Dispatcher;
pub use email_extractor::EmailExtractor;
pub use shipments::ShipmentService;
pub use webhooks::WebhookService;
