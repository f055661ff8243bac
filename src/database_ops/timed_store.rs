use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::store::{
    BinaryAttachment, EntityKind, NewRecord, Store, StoreError, StoredFile, StoredRecord,
};

/// Wraps a [`Store`] so that every call is bounded by `limit`.
///
/// A timed-out call reports [`StoreError::Timeout`] and is otherwise treated like
/// any other store failure.
pub struct TimedStore {
    inner: Arc<dyn Store>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.limit, fut)
            .await
            .map_err(|_| StoreError::Timeout { op })?
    }
}

#[async_trait]
impl Store for TimedStore {
    async fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.bounded("find", self.inner.find_by_name(kind, name))
            .await
    }

    async fn create(&self, kind: EntityKind, data: NewRecord) -> Result<StoredRecord, StoreError> {
        self.bounded("create", self.inner.create(kind, data)).await
    }

    async fn attach_file(&self, attachment: BinaryAttachment) -> Result<StoredFile, StoreError> {
        self.bounded("attach_file", self.inner.attach_file(attachment))
            .await
    }
}
