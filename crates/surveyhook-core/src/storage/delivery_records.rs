//! Repository for delivery record database operations.
//!
//! Records are append-only apart from their processing annotation: a row is
//! inserted when the call arrives and later marked processed or failed.
//!
//! The raw body is always stored. The decoded payload goes into a JSONB
//! column only when PostgreSQL can represent it; JSONB has no `\u0000`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, PgPool};
use tracing::{debug, error, warn};

use crate::{
    error::Result,
    models::{DeliveryId, DeliveryRecord, DeliveryStatus, ExceptionInfo},
};

/// Schema for the delivery record table, one statement per entry.
///
/// The `ALTER` statements upgrade tables created before the raw body was
/// stored.
pub const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS webhook_calls (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        payload JSONB,
        body BYTEA NOT NULL DEFAULT '',
        exception JSONB,
        status TEXT NOT NULL DEFAULT 'received',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        processed_at TIMESTAMPTZ
    )
    ",
    "ALTER TABLE webhook_calls ADD COLUMN IF NOT EXISTS body BYTEA NOT NULL DEFAULT ''",
    "ALTER TABLE webhook_calls ALTER COLUMN payload DROP NOT NULL",
];

const RECORD_COLUMNS: &str = "id, name, payload, body, exception, status, created_at, processed_at";

/// Returns true if PostgreSQL can store `value` as JSONB.
///
/// JSONB rejects the NUL character in any string or object key.
pub fn jsonb_compatible(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.contains('\0'),
        Value::Array(items) => items.iter().all(jsonb_compatible),
        Value::Object(map) => map.iter().all(|(k, v)| !k.contains('\0') && jsonb_compatible(v)),
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRecordRow {
    id: DeliveryId,
    name: String,
    payload: Option<Json<Value>>,
    body: Vec<u8>,
    exception: Option<Json<ExceptionInfo>>,
    status: DeliveryStatus,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<DeliveryRecordRow> for DeliveryRecord {
    fn from(row: DeliveryRecordRow) -> Self {
        let payload = match row.payload {
            Some(Json(payload)) => payload,
            None => serde_json::from_slice(&row.body).unwrap_or(Value::Null),
        };

        Self {
            id: row.id,
            name: row.name,
            payload,
            body: row.body,
            exception: row.exception.map(|Json(info)| info),
            status: row.status,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

/// Repository for delivery record database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&*self.pool).await?;
        }
        Ok(())
    }

    /// Persists a newly received delivery.
    ///
    /// `body` is stored byte for byte. `payload` is stored as JSONB when
    /// possible; otherwise reads decode it again from `body`.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, name: &str, payload: &Value, body: &[u8]) -> Result<DeliveryRecord> {
        let jsonb = jsonb_compatible(payload).then_some(Json(payload));
        if jsonb.is_none() {
            warn!(name, body_bytes = body.len(), "payload not representable as JSONB");
        }

        let row = sqlx::query_as::<_, DeliveryRecordRow>(&format!(
            r"
            INSERT INTO webhook_calls (name, payload, body, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {RECORD_COLUMNS}
            "
        ))
        .bind(name)
        .bind(jsonb)
        .bind(body)
        .bind(DeliveryStatus::Received.to_string())
        .fetch_one(&*self.pool)
        .await
        .inspect_err(|e| error!(name, error = %e, "failed to insert delivery record"))?;

        debug!(delivery_id = %row.id, "delivery record stored");
        Ok(row.into())
    }

    /// Attaches exception-info and marks the delivery failed.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_failed(&self, id: DeliveryId, exception: &ExceptionInfo) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhook_calls
            SET status = $2, exception = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(DeliveryStatus::Failed.to_string())
        .bind(Json(exception))
        .execute(&*self.pool)
        .await
        .inspect_err(|e| {
            error!(delivery_id = %id, error = %e, "failed to mark delivery failed");
        })?;

        Ok(())
    }

    /// Marks the delivery processed and clears any earlier exception.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_processed(&self, id: DeliveryId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhook_calls
            SET status = $2, exception = NULL, processed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(DeliveryStatus::Processed.to_string())
        .execute(&*self.pool)
        .await
        .inspect_err(|e| {
            error!(delivery_id = %id, error = %e, "failed to mark delivery processed");
        })?;

        Ok(())
    }

    /// Finds a delivery by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>> {
        let row = sqlx::query_as::<_, DeliveryRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM webhook_calls WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Counts all persisted deliveries.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhook_calls").fetch_one(&*self.pool).await?;
        Ok(count)
    }
}
