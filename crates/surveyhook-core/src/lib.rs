//! Core domain models and error taxonomy.
//!
//! Provides the delivery record persisted for every inbound webhook call,
//! signature verification and the verified `EventEnvelope`, the errors
//! raised while authenticating and dispatching a call, and the notification
//! observers that receive typed events. All other crates depend on these
//! types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod webhook;

pub use error::{CoreError, Result, WebhookError};
pub use events::{
    MulticastNotifier, NoOpNotifier, Notification, NotificationHandler, NOTIFICATION_NAMESPACE,
};
pub use models::{DeliveryId, DeliveryRecord, DeliveryStatus, ExceptionInfo};
pub use webhook::{construct_event, EventEnvelope, SigningMaterial};
