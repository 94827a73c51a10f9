//! Survey Monkey webhook HTTP API.
//!
//! Verifies `sm-signature` headers, persists every call and hands verified
//! deliveries to the dispatch pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use surveyhook_dispatch::ProcessingPipeline;

pub mod config;
pub mod handlers;
pub mod server;
pub mod webhook;

pub use config::Config;
pub use server::{create_router, shutdown_signal, start_server};
pub use surveyhook_core::{construct_event, crypto, EventEnvelope, SigningMaterial};
pub use webhook::{resolve_secret, signing_material};

/// Shared state for request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Persist-then-dispatch pipeline.
    pub pipeline: ProcessingPipeline,
    /// Service configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates handler state.
    pub fn new(pipeline: ProcessingPipeline, config: Arc<Config>) -> Self {
        Self { pipeline, config }
    }
}
