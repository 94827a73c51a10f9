//! Event-type routing for verified deliveries.

use std::{fmt, sync::Arc};

use surveyhook_core::{
    DeliveryRecord, EventEnvelope, Notification, NotificationHandler, WebhookError,
};
use tracing::{debug, error, instrument};

use crate::{
    registry::{HandlerMapping, HandlerRegistry},
    worker::TaskScheduler,
};

/// Payload field holding the event type unless configured otherwise.
pub const DEFAULT_EVENT_TYPE_KEY: &str = "event_type";

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification published; no handler is mapped for the type.
    Notified {
        /// Event type read from the payload.
        event_type: String,
    },
    /// Notification published and one handler job scheduled.
    Scheduled {
        /// Event type read from the payload.
        event_type: String,
        /// Identifier of the scheduled handler.
        handler: String,
    },
}

impl DispatchOutcome {
    /// Returns the event type the delivery was routed by.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Notified { event_type } | Self::Scheduled { event_type, .. } => event_type,
        }
    }

    /// Returns the scheduled handler, if any.
    pub fn handler(&self) -> Option<&str> {
        match self {
            Self::Notified { .. } => None,
            Self::Scheduled { handler, .. } => Some(handler),
        }
    }
}

/// Routes a delivery to observers and at most one handler job.
#[derive(Clone)]
pub struct DispatchRouter {
    registry: Arc<HandlerRegistry>,
    notifier: Arc<dyn NotificationHandler>,
    scheduler: Arc<dyn TaskScheduler>,
    event_type_key: String,
}

impl fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRouter")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("event_type_key", &self.event_type_key)
            .finish_non_exhaustive()
    }
}

impl DispatchRouter {
    /// Creates a router reading the type from `event_type`.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        notifier: Arc<dyn NotificationHandler>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            registry,
            notifier,
            scheduler,
            event_type_key: DEFAULT_EVENT_TYPE_KEY.to_string(),
        }
    }

    /// Reads the event type from a different payload field. Dots walk into
    /// nested objects.
    #[must_use]
    pub fn with_event_type_key(mut self, key: impl Into<String>) -> Self {
        self.event_type_key = key.into();
        self
    }

    /// Returns the payload field the type is read from.
    pub fn event_type_key(&self) -> &str {
        &self.event_type_key
    }

    /// Returns the event type of a delivery.
    ///
    /// Scalars are rendered as text; falsy values count as no type.
    pub fn event_type(&self, record: &DeliveryRecord) -> Option<String> {
        record.event_type(&self.event_type_key)
    }

    /// Dispatches one verified delivery.
    ///
    /// Publishes `surveymonkey-webhooks::<type>` to the observers, then
    /// schedules the mapped handler if there is one. An unmapped type is not
    /// an error.
    ///
    /// # Errors
    ///
    /// - `MissingType` if the payload has no event type; nothing is published.
    /// - `UnknownHandler` if the mapped handler is not registered.
    /// - `SchedulingFailed` if the task substrate refuses the job.
    #[instrument(
        name = "dispatch",
        skip(self, envelope, mapping),
        fields(delivery_id = %envelope.record().id)
    )]
    pub async fn process(
        &self,
        envelope: &EventEnvelope,
        mapping: &HandlerMapping,
    ) -> Result<DispatchOutcome, WebhookError> {
        let record = envelope.record();
        let Some(event_type) = self.event_type(record) else {
            return Err(WebhookError::MissingType { delivery_id: record.id });
        };

        self.notifier
            .handle_notification(Notification::for_event_type(&event_type, record.clone()))
            .await;

        let Some(handler) = mapping.handler_for(&event_type) else {
            debug!(event_type = %event_type, "no handler mapped for event type");
            return Ok(DispatchOutcome::Notified { event_type });
        };

        let Some(job) = self.registry.build(handler, record.clone()) else {
            let error = WebhookError::UnknownHandler {
                handler: handler.to_string(),
                event_type,
                delivery_id: record.id,
            };
            error!(error = %error, "configured handler is not registered");
            return Err(error);
        };

        self.scheduler.schedule(job)?;
        debug!(event_type = %event_type, handler, "handler job scheduled");

        Ok(DispatchOutcome::Scheduled { event_type, handler: handler.to_string() })
    }
}
