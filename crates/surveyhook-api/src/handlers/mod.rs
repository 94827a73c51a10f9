//! HTTP request handlers.
//!
//! - `ingest` - Survey Monkey webhook endpoints
//! - `health` - Delivery store health check
//!
//! Failures answer with `{"error": {"code", "message"}}`, using the status
//! code and error code of the underlying `WebhookError`.

pub mod health;
pub mod ingest;

pub use health::health_check;
pub use ingest::{ingest_keyed_webhook, ingest_webhook};
