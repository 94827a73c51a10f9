//! Event-type routing and task scheduling for verified webhook deliveries.
//!
//! A delivery record is persisted first and its signature verified. The
//! resulting `EventEnvelope` is handed to the processing pipeline which runs
//! the dispatch router against it:
//!
//! 1. **Extract Type** - Read the configured event-type field
//! 2. **Notify** - Publish `surveymonkey-webhooks::<type>` with the record
//! 3. **Resolve** - Map the sanitised type to a handler identifier
//! 4. **Schedule** - Hand one job for that handler to the worker pool
//!
//! The router itself holds no mutable state; the handler mapping is read-only
//! for the duration of a run and each delivery is processed independently.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use surveyhook_core::{construct_event, NoOpNotifier, SigningMaterial};
//! use surveyhook_dispatch::{
//!     storage::mock::MockDeliveryStore, DispatchRouter, HandlerMapping, HandlerRegistry,
//!     ProcessingPipeline, WorkerConfig, WorkerPool,
//! };
//!
//! # async fn example(
//! #     material: SigningMaterial,
//! #     secret: &str,
//! # ) -> Result<(), surveyhook_core::WebhookError> {
//! let mut pool = WorkerPool::new(WorkerConfig::default());
//! pool.spawn_workers();
//!
//! let router = DispatchRouter::new(
//!     Arc::new(HandlerRegistry::with_builtin_jobs()),
//!     Arc::new(NoOpNotifier::new()),
//!     Arc::new(pool.queue()),
//! );
//! let pipeline = ProcessingPipeline::new(
//!     Arc::new(MockDeliveryStore::new()),
//!     router,
//!     Arc::new(HandlerMapping::default()),
//! );
//!
//! let payload = serde_json::from_slice(&material.payload).unwrap_or_default();
//! let record = pipeline.ingest(payload, material.payload.to_vec()).await?;
//! let envelope = construct_event(record, &material, secret)?;
//! pipeline.process(&envelope).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod router;
pub mod storage;
pub mod worker;

pub use error::{Result, WorkerError};
pub use pipeline::{ProcessingPipeline, DEFAULT_WEBHOOK_NAME};
pub use registry::{sanitize_event_type, HandlerMapping, HandlerRegistry, JobFactory, WebhookJob};
pub use router::{DispatchOutcome, DispatchRouter, DEFAULT_EVENT_TYPE_KEY};
pub use storage::DeliveryStore;
pub use worker::{JobQueue, TaskScheduler, WorkerConfig, WorkerPool, WorkerStatsSnapshot};

/// Default number of concurrent handler workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default capacity of the handler job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
