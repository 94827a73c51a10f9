//! Delivery record model and strongly-typed identifiers.
//!
//! A delivery record is created for every inbound webhook call before any
//! verification or dispatch happens, so malformed or forged calls are still
//! retained for audit. The pipeline reads the payload and reports failures;
//! only the store mutates the record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Store-assigned delivery identifier.
///
/// Sequential so operators can refer to "webhook call 1" in logs and
/// exception messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(pub i64);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DeliveryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Processing state of a delivery record.
///
/// ```text
/// Received ──▶ Processed
///     │
///     └──────▶ Failed
/// ```
///
/// There are no backward transitions. A retry by the task substrate
/// re-enters with a fresh processing run, not a state rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Persisted, not yet verified or dispatched.
    Received,

    /// Notification published and handler (if any) scheduled.
    Processed,

    /// Verification or dispatch failed; exception-info is set.
    Failed,
}

impl DeliveryStatus {
    /// Returns true for states that accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "received" => Ok(Self::Received),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

/// Failure annotation attached to a record by the processing harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Error kind, e.g. `missing_type`.
    pub kind: String,

    /// Stable error code, e.g. `E1002`.
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

/// One inbound webhook call as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Store-assigned identifier.
    pub id: DeliveryId,

    /// Name of the webhook source, e.g. `survey-monkey`.
    pub name: String,

    /// Decoded payload. `Value::Null` when the body is not JSON.
    pub payload: Value,

    /// Request body exactly as received.
    #[serde(default)]
    pub body: Vec<u8>,

    /// Set only when processing failed.
    pub exception: Option<ExceptionInfo>,

    /// Current processing state.
    pub status: DeliveryStatus,

    /// When the call was persisted.
    pub created_at: DateTime<Utc>,

    /// When processing completed successfully.
    pub processed_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Creates a freshly received record.
    pub fn new(id: DeliveryId, name: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            name: name.into(),
            payload,
            body: Vec::new(),
            exception: None,
            status: DeliveryStatus::Received,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Attaches the raw request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns true once processing completed successfully.
    pub fn is_processed(&self) -> bool {
        self.status == DeliveryStatus::Processed
    }

    /// Looks up a payload value by dot-separated path.
    ///
    /// `meta.event_type` walks into nested objects. Arrays and scalars have
    /// no keys, so any path into them yields `None`.
    pub fn payload_value(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.payload, |value, segment| value.as_object()?.get(segment))
    }

    /// Reads the event type at a dot-separated payload path.
    ///
    /// Scalars are rendered as text. Falsy values (`null`, `false`, `0`,
    /// `""`, `"0"`) and arrays or objects count as no type.
    pub fn event_type(&self, path: &str) -> Option<String> {
        let event_type = match self.payload_value(path)? {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.as_f64().is_some_and(|n| n != 0.0) => n.to_string(),
            Value::Bool(true) => "1".to_string(),
            _ => return None,
        };

        (!event_type.is_empty() && event_type != "0").then_some(event_type)
    }
}
