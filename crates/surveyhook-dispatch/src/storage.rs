//! Delivery store abstraction.
//!
//! The pipeline persists, annotates and reads delivery records only through
//! `DeliveryStore`. Production wraps the Postgres repositories from the core
//! crate; tests use the in-memory `mock::MockDeliveryStore`.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use surveyhook_core::{
    error::Result,
    models::{DeliveryId, DeliveryRecord, ExceptionInfo},
    storage::Storage,
    CoreError,
};

/// Append-only store of delivery records.
pub trait DeliveryStore: Send + Sync + 'static {
    /// Persists a newly received delivery and returns it with its id.
    ///
    /// `body` is the request body byte for byte; `payload` its decoding, or
    /// `Value::Null` if it is not JSON.
    fn create(
        &self,
        name: String,
        payload: Value,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryRecord>> + Send + '_>>;

    /// Attaches exception-info and marks the delivery failed.
    fn mark_failed(
        &self,
        id: DeliveryId,
        exception: ExceptionInfo,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Marks the delivery processed.
    fn mark_processed(&self, id: DeliveryId)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds a delivery by id.
    fn find(
        &self,
        id: DeliveryId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeliveryRecord>>> + Send + '_>>;

    /// Counts persisted deliveries.
    fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;

    /// Verifies the backing store is reachable.
    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production store backed by PostgreSQL.
pub struct PostgresDeliveryStore {
    storage: Arc<Storage>,
}

impl PostgresDeliveryStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl DeliveryStore for PostgresDeliveryStore {
    fn create(
        &self,
        name: String,
        payload: Value,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryRecord>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_records.create(&name, &payload, &body).await })
    }

    fn mark_failed(
        &self,
        id: DeliveryId,
        exception: ExceptionInfo,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_records.mark_failed(id, &exception).await })
    }

    fn mark_processed(
        &self,
        id: DeliveryId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_records.mark_processed(id).await })
    }

    fn find(
        &self,
        id: DeliveryId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeliveryRecord>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_records.find_by_id(id).await })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let count = storage.delivery_records.count().await?;
            u64::try_from(count).map_err(|_| CoreError::Database(format!("negative count {count}")))
        })
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.health_check().await })
    }
}

pub mod mock {
    //! In-memory store for tests.
    //!
    //! Assigns sequential ids starting at 1 and supports injecting a failure
    //! into the next write.

    use std::{
        collections::BTreeMap,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicI64, Ordering},
            Arc,
        },
    };

    use chrono::Utc;
    use serde_json::Value;
    use surveyhook_core::{error::Result, models::DeliveryStatus, CoreError};
    use tokio::sync::RwLock;

    use super::{DeliveryId, DeliveryRecord, DeliveryStore, ExceptionInfo};

    /// In-memory delivery store.
    #[derive(Debug, Default)]
    pub struct MockDeliveryStore {
        records: Arc<RwLock<BTreeMap<DeliveryId, DeliveryRecord>>>,
        next_id: AtomicI64,
        write_error: Arc<RwLock<Option<String>>>,
    }

    impl MockDeliveryStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next write fail with a database error.
        pub async fn inject_write_error(&self, error: impl Into<String>) {
            *self.write_error.write().await = Some(error.into());
        }

        /// Returns every record in id order.
        pub async fn records(&self) -> Vec<DeliveryRecord> {
            self.records.read().await.values().cloned().collect()
        }

        /// Returns the most recently created record.
        pub async fn last(&self) -> Option<DeliveryRecord> {
            self.records.read().await.values().next_back().cloned()
        }

        async fn take_write_error(&self) -> Result<()> {
            match self.write_error.write().await.take() {
                Some(error) => Err(CoreError::Database(error)),
                None => Ok(()),
            }
        }

        async fn update<F>(&self, id: DeliveryId, apply: F) -> Result<()>
        where
            F: FnOnce(&mut DeliveryRecord) + Send,
        {
            self.take_write_error().await?;
            let mut records = self.records.write().await;
            let record = records
                .get_mut(&id)
                .ok_or_else(|| CoreError::NotFound(format!("delivery {id} not found")))?;
            apply(record);
            Ok(())
        }
    }

    impl DeliveryStore for MockDeliveryStore {
        fn create(
            &self,
            name: String,
            payload: Value,
            body: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<DeliveryRecord>> + Send + '_>> {
            Box::pin(async move {
                self.take_write_error().await?;
                let id = DeliveryId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
                let record = DeliveryRecord::new(id, name, payload).with_body(body);
                self.records.write().await.insert(id, record.clone());
                Ok(record)
            })
        }

        fn mark_failed(
            &self,
            id: DeliveryId,
            exception: ExceptionInfo,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(self.update(id, move |record| {
                record.status = DeliveryStatus::Failed;
                record.exception = Some(exception);
            }))
        }

        fn mark_processed(
            &self,
            id: DeliveryId,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(self.update(id, |record| {
                record.status = DeliveryStatus::Processed;
                record.exception = None;
                record.processed_at = Some(Utc::now());
            }))
        }

        fn find(
            &self,
            id: DeliveryId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<DeliveryRecord>>> + Send + '_>> {
            Box::pin(async move { Ok(self.records.read().await.get(&id).cloned()) })
        }

        fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
            Box::pin(async move { Ok(self.records.read().await.len() as u64) })
        }

        fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

}
