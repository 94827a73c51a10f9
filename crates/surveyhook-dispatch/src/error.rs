//! Error types for the worker pool lifecycle.
//!
//! Dispatch failures themselves are `WebhookError`s from the core crate;
//! this module only covers the task substrate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for worker pool operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Worker pool lifecycle failures.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// Workers did not stop within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Index of the worker
        worker_id: usize,
        /// Join error description
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        let error = WorkerError::ShutdownTimeout { timeout: Duration::from_secs(30) };
        assert_eq!(error.to_string(), "worker shutdown timed out after 30s");

        let panic = WorkerError::WorkerPanic { worker_id: 2, error: "boom".to_string() };
        assert_eq!(panic.to_string(), "worker 2 panicked: boom");
    }
}
