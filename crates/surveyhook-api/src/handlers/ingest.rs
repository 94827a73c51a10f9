//! Webhook ingestion handler.
//!
//! Every call is persisted before its signature is checked, so rejected
//! calls remain visible as failed delivery records. The body is stored byte
//! for byte whether or not it decodes.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surveyhook_core::{construct_event, WebhookError};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    webhook::{resolve_secret, signing_material},
    AppState,
};

/// Body returned for an accepted webhook call.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    /// Always `ok`.
    pub message: String,
}

/// Error response with code and message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy (E1001-E3002)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Receives a webhook call signed with the default secret.
///
/// # Errors
///
/// Answers with the error's status code:
/// - 400: Body is not JSON, or the payload has no event type
/// - 413: Body exceeds the configured limit
/// - 500: Signature verification failed, unknown handler, storage failure
#[instrument(name = "ingest_webhook", skip_all)]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    handle_webhook(&state, None, &headers, body).await
}

/// Receives a webhook call signed with the secret stored under
/// `config_key`.
#[instrument(name = "ingest_webhook", skip(state, headers, body))]
pub async fn ingest_keyed_webhook(
    State(state): State<AppState>,
    Path(config_key): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    handle_webhook(&state, Some(&config_key), &headers, body).await
}

async fn handle_webhook(
    state: &AppState,
    config_key: Option<&str>,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejection_response(state, headers, &rejection),
    };

    debug!(payload_size = body.len(), "processing webhook call");

    let (payload, parse_error) = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => (payload, None),
        Err(e) => (Value::Null, Some(WebhookError::InvalidPayload { reason: e.to_string() })),
    };

    let record = match state.pipeline.ingest(payload, body.to_vec()).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "failed to persist webhook call");
            return error_response(&e);
        },
    };

    if let Some(e) = parse_error {
        state.pipeline.reject(&record, &e).await;
        return error_response(&e);
    }

    let config = &state.config;
    let secret = resolve_secret(config, config_key).unwrap_or_default();
    if secret.is_empty() {
        warn!(delivery_id = %record.id, config_key, "no signing secret configured");
    }

    let verified =
        signing_material(headers, body, &config.api_key_header, &config.signature_header)
            .and_then(|material| construct_event(record.clone(), &material, secret));

    let envelope = match verified {
        Ok(envelope) => envelope,
        Err(e) => {
            state.pipeline.reject(&record, &e).await;
            return error_response(&e);
        },
    };

    debug!(delivery_id = %record.id, "webhook signature verified");

    match state.pipeline.process(&envelope).await {
        Ok(outcome) => {
            info!(
                delivery_id = %record.id,
                event_type = outcome.event_type(),
                "webhook call accepted"
            );
            (StatusCode::OK, Json(IngestResponse { message: "ok".to_string() })).into_response()
        },
        Err(e) => error_response(&e),
    }
}

fn body_rejection_response(
    state: &AppState,
    headers: &HeaderMap,
    rejection: &BytesRejection,
) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size_bytes = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let error = WebhookError::PayloadTooLarge {
            size_bytes,
            limit_bytes: state.config.max_body_bytes,
        };
        warn!(size_bytes, limit = state.config.max_body_bytes, "payload exceeds size limit");
        return error_response(&error);
    }

    warn!(error = %rejection.body_text(), "failed to read request body");
    error_response(&WebhookError::InvalidPayload { reason: rejection.body_text() })
}

/// Creates a standardized error response.
pub fn error_response(error: &WebhookError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error_response = ErrorResponse {
        error: ErrorDetail { code: error.code().to_string(), message: error.to_string() },
    };

    (status, Json(error_response)).into_response()
}
