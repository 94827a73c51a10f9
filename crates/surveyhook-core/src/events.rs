//! Notification observers for typed webhook events.
//!
//! Once a delivery's event type is known the router publishes a named
//! notification carrying the full record. Observers are registered
//! explicitly and passed into the router; there is no global bus.
//!
//! ```text
//!                 surveymonkey-webhooks::<type>
//! ┌────────────────┐                      ┌────────────────────┐
//! │ DispatchRouter │ ────────────────────▶│ MulticastNotifier  │
//! │ (Publisher)    │                      │ (Fan-out)          │
//! └────────────────┘                      └────────────────────┘
//!                                                   │
//!                                                   ▼
//!                                         ┌────────────────────┐
//!                                         │ Subscribers        │
//!                                         │ (audit, metrics,   │
//!                                         │  application code) │
//!                                         └────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::DeliveryRecord;

/// Namespace prefixed to every notification name.
pub const NOTIFICATION_NAMESPACE: &str = "surveymonkey-webhooks";

/// Named notification published for a typed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Full name, `surveymonkey-webhooks::<event type>`.
    pub name: String,

    /// The delivery that produced the notification.
    pub record: DeliveryRecord,
}

impl Notification {
    /// Builds the notification for an event type.
    pub fn for_event_type(event_type: &str, record: DeliveryRecord) -> Self {
        Self { name: Self::name_for(event_type), record }
    }

    /// Returns the notification name for an event type.
    pub fn name_for(event_type: &str) -> String {
        format!("{NOTIFICATION_NAMESPACE}::{event_type}")
    }

    /// Returns the event type part of the name.
    pub fn event_type(&self) -> &str {
        self.name
            .strip_prefix(NOTIFICATION_NAMESPACE)
            .and_then(|rest| rest.strip_prefix("::"))
            .unwrap_or(&self.name)
    }
}

/// Observer of webhook notifications.
///
/// Implementations must not fail the dispatch. Errors inside an observer are
/// logged by the observer and swallowed.
#[async_trait::async_trait]
pub trait NotificationHandler: Send + Sync + std::fmt::Debug {
    /// Handles a published notification.
    async fn handle_notification(&self, notification: Notification);
}

/// Notifier that discards everything.
#[derive(Debug, Default)]
pub struct NoOpNotifier;

impl NoOpNotifier {
    /// Creates a new no-op notifier.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl NotificationHandler for NoOpNotifier {
    async fn handle_notification(&self, _notification: Notification) {}
}

/// Fans notifications out to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastNotifier {
    subscribers: Vec<Arc<dyn NotificationHandler>>,
}

impl MulticastNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    /// Registers a subscriber.
    pub fn subscribe(&mut self, subscriber: Arc<dyn NotificationHandler>) {
        self.subscribers.push(subscriber);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait::async_trait]
impl NotificationHandler for MulticastNotifier {
    async fn handle_notification(&self, notification: Notification) {
        let futures = self.subscribers.iter().map(|subscriber| {
            let notification = notification.clone();
            async move {
                subscriber.handle_notification(notification).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
