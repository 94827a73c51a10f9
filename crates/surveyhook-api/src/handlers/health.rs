//! Health check handler for service monitoring.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Delivery store check
    pub database: ComponentHealth,
    /// Service version information
    pub version: String,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Delivery store reachable
    Healthy,
    /// Delivery store unreachable
    Unhealthy,
}

/// Health of one dependency.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Failure description, if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Reports whether the delivery store is reachable.
///
/// Answers 200 when healthy and 503 otherwise.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let result = state.pipeline.store().health_check().await;
    let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (status, message) = match result {
        Ok(()) => (HealthStatus::Healthy, None),
        Err(e) => {
            error!(error = %e, "delivery store health check failed");
            (HealthStatus::Unhealthy, Some(format!("Database connection failed: {e}")))
        },
    };

    debug!(?status, response_time_ms, "health check completed");

    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        database: ComponentHealth { message, response_time_ms },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response)).into_response()
}
