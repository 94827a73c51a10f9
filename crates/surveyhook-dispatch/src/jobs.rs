//! Jobs shipped with the dispatcher.
//!
//! Applications register their own jobs next to these; the mapping in
//! configuration decides which one runs for an event type.

use surveyhook_core::DeliveryRecord;
use tracing::info;

use crate::registry::{HandlerRegistry, WebhookJob};

/// Handler for `response.completed` deliveries.
///
/// Logs the completed response. Map it with
/// `jobs.response_completed = "handle_response_completed"`.
#[derive(Debug, Clone)]
pub struct HandleResponseCompleted {
    record: DeliveryRecord,
}

impl HandleResponseCompleted {
    /// Identifier the job is registered under.
    pub const NAME: &'static str = "handle_response_completed";

    /// Creates the job for a delivery.
    pub fn new(record: DeliveryRecord) -> Self {
        Self { record }
    }
}

#[async_trait::async_trait]
impl WebhookJob for HandleResponseCompleted {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn record(&self) -> &DeliveryRecord {
        &self.record
    }

    async fn run(&self) -> anyhow::Result<()> {
        let resource_id =
            self.record.payload_value("object_id").and_then(|value| value.as_str()).unwrap_or("-");

        info!(
            delivery_id = %self.record.id,
            resource_id,
            "survey response completed"
        );

        Ok(())
    }
}

/// Registers every built-in job.
pub fn register_builtin_jobs(registry: &mut HandlerRegistry) {
    registry.register(HandleResponseCompleted::NAME, |record| {
        Box::new(HandleResponseCompleted::new(record))
    });
}
