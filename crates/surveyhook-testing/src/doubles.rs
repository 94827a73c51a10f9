//! Recording test doubles for notifiers, schedulers and jobs.

use std::sync::{Arc, Mutex};

use surveyhook_core::{DeliveryId, DeliveryRecord, Notification, NotificationHandler, WebhookError};
use surveyhook_dispatch::{HandlerRegistry, TaskScheduler, WebhookJob};

/// Identifier `DummyJob` is registered under.
pub const DUMMY_HANDLER: &str = "dummy";

/// Notifier that remembers every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of received notifications in order.
    pub fn names(&self) -> Vec<String> {
        self.notifications().into_iter().map(|notification| notification.name).collect()
    }

    /// Returns received notifications in order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().map(|received| received.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationHandler for RecordingNotifier {
    async fn handle_notification(&self, notification: Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification);
        }
    }
}

/// Scheduler that runs nothing and records what it was given.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(String, DeliveryId)>>,
    reject: bool,
}

impl RecordingScheduler {
    /// Creates a scheduler accepting every job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler refusing every job.
    pub fn rejecting() -> Self {
        Self { reject: true, ..Self::default() }
    }

    /// Returns `(handler, delivery id)` for each accepted job.
    pub fn scheduled(&self) -> Vec<(String, DeliveryId)> {
        self.scheduled.lock().map(|scheduled| scheduled.clone()).unwrap_or_default()
    }
}

impl TaskScheduler for RecordingScheduler {
    fn schedule(&self, job: Box<dyn WebhookJob>) -> Result<(), WebhookError> {
        if self.reject {
            return Err(WebhookError::SchedulingFailed {
                handler: job.name().to_string(),
                reason: "job queue is full".to_string(),
            });
        }

        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.push((job.name().to_string(), job.record().id));
        }
        Ok(())
    }
}

/// Job that records the deliveries it ran for.
#[derive(Debug)]
pub struct DummyJob {
    record: DeliveryRecord,
    runs: Arc<Mutex<Vec<DeliveryId>>>,
}

impl DummyJob {
    /// Registers `DummyJob` as `dummy`, recording runs into `runs`.
    pub fn register(registry: &mut HandlerRegistry, runs: Arc<Mutex<Vec<DeliveryId>>>) {
        registry.register(DUMMY_HANDLER, move |record| {
            Box::new(DummyJob { record, runs: runs.clone() })
        });
    }
}

#[async_trait::async_trait]
impl WebhookJob for DummyJob {
    fn name(&self) -> &str {
        DUMMY_HANDLER
    }

    fn record(&self) -> &DeliveryRecord {
        &self.record
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.runs
            .lock()
            .map_err(|_| anyhow::anyhow!("run log poisoned"))?
            .push(self.record.id);
        Ok(())
    }
}
