//! Error types and result handling for webhook operations.
//!
//! Defines the failure taxonomy of the verification-and-dispatch pipeline
//! with stable codes and HTTP status mapping. Every `WebhookError` can be
//! rendered into the `ExceptionInfo` persisted on the delivery record.

use thiserror::Error;

use crate::models::{DeliveryId, ExceptionInfo};

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Failures raised while authenticating and dispatching a delivery.
///
/// None of these are retried by the component that detects them. Retrying a
/// whole processing unit is up to the task substrate.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// Claimed signature did not match, or signing material was missing.
    ///
    /// Surfaced as a server error: a mismatch is a trust anomaly, not a
    /// routine client mistake.
    #[error("Signature Verification Failed")]
    SignatureVerification {
        /// Why verification failed, for logs only.
        reason: String,
    },

    /// Delivery payload lacks the configured event-type field.
    #[error(
        "Webhook call id `{delivery_id}` did not contain a type. Valid webhook calls should \
         always contain a type."
    )]
    MissingType {
        /// Record that carried the untyped payload.
        delivery_id: DeliveryId,
    },

    /// Configuration names a handler that is not registered.
    #[error(
        "Could not process webhook id `{delivery_id}` of type `{event_type}` because the \
         configured handler `{handler}` does not exist."
    )]
    UnknownHandler {
        /// Handler identifier taken from configuration.
        handler: String,
        /// Event type that selected the handler.
        event_type: String,
        /// Record being dispatched.
        delivery_id: DeliveryId,
    },

    /// Request body was not a JSON document.
    #[error("Invalid payload: {reason}")]
    InvalidPayload {
        /// Parser error.
        reason: String,
    },

    /// Request body exceeded the accepted size.
    #[error("Payload too large: size {size_bytes} bytes exceeds {limit_bytes} bytes")]
    PayloadTooLarge {
        /// Size of the rejected body.
        size_bytes: usize,
        /// Configured limit.
        limit_bytes: usize,
    },

    /// Handler task could not be handed to the task substrate.
    #[error("Failed to schedule handler `{handler}`: {reason}")]
    SchedulingFailed {
        /// Handler that was being scheduled.
        handler: String,
        /// Queue failure description.
        reason: String,
    },

    /// Delivery store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] CoreError),
}

impl WebhookError {
    /// Creates a signature verification error with a log reason.
    pub fn signature(reason: impl Into<String>) -> Self {
        Self::SignatureVerification { reason: reason.into() }
    }

    /// Returns the stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SignatureVerification { .. } => "E1001",
            Self::MissingType { .. } => "E1002",
            Self::UnknownHandler { .. } => "E1003",
            Self::InvalidPayload { .. } => "E1004",
            Self::PayloadTooLarge { .. } => "E1005",
            Self::SchedulingFailed { .. } => "E3001",
            Self::Storage(_) => "E3002",
        }
    }

    /// Returns the HTTP status the ingest boundary answers with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MissingType { .. } | Self::InvalidPayload { .. } => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::SignatureVerification { .. }
            | Self::UnknownHandler { .. }
            | Self::SchedulingFailed { .. }
            | Self::Storage(_) => 500,
        }
    }

    /// Returns the snake_case kind persisted in exception-info.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SignatureVerification { .. } => "signature_verification",
            Self::MissingType { .. } => "missing_type",
            Self::UnknownHandler { .. } => "unknown_handler",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::SchedulingFailed { .. } => "scheduling_failed",
            Self::Storage(_) => "storage",
        }
    }

    /// Returns whether re-running the whole processing unit could succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SchedulingFailed { .. } | Self::Storage(_))
    }

    /// Renders the error for the delivery record's exception column.
    pub fn exception_info(&self) -> ExceptionInfo {
        ExceptionInfo {
            kind: self.kind().to_string(),
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
