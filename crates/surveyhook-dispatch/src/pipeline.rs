//! Persist-then-dispatch harness around the router.
//!
//! Every inbound call becomes a delivery record before anything else looks
//! at it, so a rejected or failing call is still auditable. Only a verified
//! `EventEnvelope` reaches the router; the record is then marked processed
//! or failed depending on the dispatch result.

use std::{fmt, sync::Arc};

use serde_json::Value;
use surveyhook_core::{DeliveryRecord, EventEnvelope, WebhookError};
use tracing::{error, info, warn};

use crate::{
    registry::HandlerMapping,
    router::{DispatchOutcome, DispatchRouter},
    storage::DeliveryStore,
};

/// Webhook name stored on records unless configured otherwise.
pub const DEFAULT_WEBHOOK_NAME: &str = "survey-monkey";

/// Runs the router against persisted deliveries and records the result.
#[derive(Clone)]
pub struct ProcessingPipeline {
    store: Arc<dyn DeliveryStore>,
    router: DispatchRouter,
    mapping: Arc<HandlerMapping>,
    name: String,
}

impl fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("name", &self.name)
            .field("router", &self.router)
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl ProcessingPipeline {
    /// Creates a pipeline storing records as `survey-monkey`.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        router: DispatchRouter,
        mapping: Arc<HandlerMapping>,
    ) -> Self {
        Self { store, router, mapping, name: DEFAULT_WEBHOOK_NAME.to_string() }
    }

    /// Stores records under a different webhook name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the webhook name records are stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the delivery store.
    pub fn store(&self) -> &Arc<dyn DeliveryStore> {
        &self.store
    }

    /// Persists an inbound call as a new delivery record.
    ///
    /// `body` is kept byte for byte; `payload` is its decoding, or
    /// `Value::Null` if the body is not JSON.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Storage` if the store rejects the write.
    pub async fn ingest(
        &self,
        payload: Value,
        body: impl Into<Vec<u8>>,
    ) -> Result<DeliveryRecord, WebhookError> {
        let record = self.store.create(self.name.clone(), payload, body.into()).await?;
        info!(delivery_id = %record.id, name = %record.name, "webhook call stored");
        Ok(record)
    }

    /// Dispatches a verified delivery and marks it processed or failed.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error after recording it on the delivery, or a
    /// storage error if the processed mark cannot be written.
    pub async fn process(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<DispatchOutcome, WebhookError> {
        let record = envelope.record();
        match self.router.process(envelope, &self.mapping).await {
            Ok(outcome) => {
                self.store.mark_processed(record.id).await?;
                info!(
                    delivery_id = %record.id,
                    event_type = outcome.event_type(),
                    handler = outcome.handler().unwrap_or("-"),
                    "webhook call processed"
                );
                Ok(outcome)
            },
            Err(error) => {
                self.reject(record, &error).await;
                Err(error)
            },
        }
    }

    /// Marks a delivery failed with the error's exception-info.
    ///
    /// A store failure here is logged; the caller keeps reporting the
    /// original error.
    pub async fn reject(&self, record: &DeliveryRecord, error: &WebhookError) {
        warn!(
            delivery_id = %record.id,
            code = error.code(),
            error = %error,
            "webhook call failed"
        );

        if let Err(store_error) = self.store.mark_failed(record.id, error.exception_info()).await {
            error!(
                delivery_id = %record.id,
                error = %store_error,
                "failed to record webhook call failure"
            );
        }
    }
}
