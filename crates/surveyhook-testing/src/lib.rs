//! Test infrastructure for the webhook pipeline.
//!
//! `TestEnv` wires the real router, pipeline and HTTP layer to an in-memory
//! delivery store and recording doubles, so tests can drive requests end to
//! end without PostgreSQL.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use surveyhook_api::{create_router, AppState, Config};
use surveyhook_core::{DeliveryId, DeliveryRecord};
use surveyhook_dispatch::{
    storage::mock::MockDeliveryStore, DispatchRouter, HandlerRegistry, ProcessingPipeline,
};
use tower::ServiceExt;

pub mod doubles;
pub mod fixtures;

pub use doubles::{DummyJob, RecordingNotifier, RecordingScheduler, DUMMY_HANDLER};
pub use fixtures::{
    ingest_json, sign, verified, WebhookRequestBuilder, TEST_API_KEY, TEST_SECRET,
};

/// Response captured from the router.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body parsed as JSON, `Value::Null` if it is not JSON
    pub body: Value,
}

impl TestResponse {
    /// Returns `error.code` from an error body.
    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }

    /// Returns `error.message` from an error body.
    pub fn error_message(&self) -> Option<&str> {
        self.body["error"]["message"].as_str()
    }
}

/// In-memory environment running the full HTTP stack.
pub struct TestEnv {
    /// Delivery store
    pub store: Arc<MockDeliveryStore>,
    /// Observer receiving every notification
    pub notifier: Arc<RecordingNotifier>,
    /// Scheduler receiving every handler job
    pub scheduler: Arc<RecordingScheduler>,
    /// Deliveries `DummyJob` ran for
    pub dummy_runs: Arc<Mutex<Vec<DeliveryId>>>,
    /// Effective configuration
    pub config: Arc<Config>,
    /// Pipeline the router hands calls to
    pub pipeline: ProcessingPipeline,
}

impl TestEnv {
    /// Creates an environment with the test secret and no job mapping.
    pub fn new() -> Self {
        TestEnvBuilder::new().build()
    }

    /// Starts configuring an environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::new()
    }

    /// Returns the HTTP router.
    pub fn router(&self) -> Router {
        create_router(AppState::new(self.pipeline.clone(), self.config.clone()))
    }

    /// Returns a request builder signing with the test credentials.
    pub fn request(&self) -> WebhookRequestBuilder {
        WebhookRequestBuilder::new()
    }

    /// Sends a request through the router.
    ///
    /// # Errors
    ///
    /// Returns an error if the router fails or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<TestResponse> {
        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Ok(TestResponse { status, headers, body })
    }

    /// Returns the most recently stored delivery.
    pub async fn last_record(&self) -> Option<DeliveryRecord> {
        self.store.last().await
    }

    /// Returns every stored delivery.
    pub async fn records(&self) -> Vec<DeliveryRecord> {
        self.store.records().await
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TestEnv`.
#[derive(Debug)]
pub struct TestEnvBuilder {
    config: Config,
    rejecting_scheduler: bool,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvBuilder {
    /// Creates a builder with the test secret as default secret.
    pub fn new() -> Self {
        Self {
            config: Config { signing_secret: TEST_SECRET.to_string(), ..Config::default() },
            rejecting_scheduler: false,
        }
    }

    /// Replaces the default signing secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.signing_secret = secret.into();
        self
    }

    /// Adds a secret selected by a route config key.
    #[must_use]
    pub fn keyed_secret(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.signing_secrets.insert(key.into(), secret.into());
        self
    }

    /// Maps a sanitised event type to a handler identifier.
    #[must_use]
    pub fn job(mut self, event_key: impl Into<String>, handler: impl Into<String>) -> Self {
        self.config.jobs.insert(event_key, handler);
        self
    }

    /// Reads the event type from a different payload field.
    #[must_use]
    pub fn event_type_key(mut self, key: impl Into<String>) -> Self {
        self.config.event_type_key = key.into();
        self
    }

    /// Limits request bodies.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.max_body_bytes = limit;
        self
    }

    /// Makes the scheduler refuse every job.
    #[must_use]
    pub fn rejecting_scheduler(mut self) -> Self {
        self.rejecting_scheduler = true;
        self
    }

    /// Builds the environment.
    pub fn build(self) -> TestEnv {
        let store = Arc::new(MockDeliveryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = Arc::new(if self.rejecting_scheduler {
            RecordingScheduler::rejecting()
        } else {
            RecordingScheduler::new()
        });
        let dummy_runs = Arc::new(Mutex::new(Vec::new()));

        let mut registry = HandlerRegistry::with_builtin_jobs();
        DummyJob::register(&mut registry, dummy_runs.clone());

        let router =
            DispatchRouter::new(Arc::new(registry), notifier.clone(), scheduler.clone())
                .with_event_type_key(self.config.event_type_key.clone());
        let pipeline =
            ProcessingPipeline::new(store.clone(), router, Arc::new(self.config.jobs.clone()))
                .with_name(self.config.webhook_name.clone());

        TestEnv {
            store,
            notifier,
            scheduler,
            dummy_runs,
            config: Arc::new(self.config),
            pipeline,
        }
    }
}
