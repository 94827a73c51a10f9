//! Database access layer for delivery records.
//!
//! All SQL touching the `webhook_calls` table lives in this module. The
//! dispatch crate adapts these repositories behind its store trait.

use std::sync::Arc;

use sqlx::PgPool;

pub mod delivery_records;

use crate::error::Result;

/// Container for all repository instances.
#[derive(Clone)]
pub struct Storage {
    /// Repository for delivery record operations.
    pub delivery_records: Arc<delivery_records::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { delivery_records: Arc::new(delivery_records::Repository::new(pool)) }
    }

    /// Executes a trivial query to verify database connectivity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) =
            sqlx::query_as("SELECT 1").fetch_one(&*self.delivery_records.pool()).await?;

        Ok(())
    }
}
