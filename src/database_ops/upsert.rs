//! Create-if-absent keyed by exact name.
//!
//! Find-then-create is not atomic at the store, so two callers racing on the same
//! `(kind, name)` would both see "absent" and both insert. [`KeyedLocks`] serializes
//! callers per key; different keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::resolver::Resolver;
use super::store::{EntityKind, NewRecord, RecordRef, Store, StoreError};
use crate::normalization::normalize;

type LockKey = (EntityKind, String);

/// Per-key async lock table.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, kind: EntityKind, name: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots
                .entry((kind, name.to_string()))
                .or_default()
                .clone()
        };
        slot.lock_owned().await
    }

    /// Drop slots nobody holds or waits on.
    pub fn prune(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(RecordRef),
    Existing(RecordRef),
}

#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error("refusing to create {kind} with an empty name")]
    EmptyName { kind: EntityKind },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ensures exactly one named record exists per `(kind, name)`.
#[derive(Clone)]
pub struct Upserter {
    store: Arc<dyn Store>,
    resolver: Resolver,
    locks: Arc<KeyedLocks>,
}

impl Upserter {
    pub fn new(store: Arc<dyn Store>, locks: Arc<KeyedLocks>) -> Self {
        Self {
            resolver: Resolver::new(store.clone()),
            store,
            locks,
        }
    }

    /// Existing records are returned untouched, even if their slug would normalize
    /// differently today.
    pub async fn ensure_exists(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<UpsertOutcome, UpsertError> {
        let slug = normalize(name);
        if name.trim().is_empty() || slug.is_empty() {
            return Err(UpsertError::EmptyName { kind });
        }

        let _guard = self.locks.acquire(kind, name).await;
        if let Some(existing) = self.resolver.resolve(kind, name).await? {
            return Ok(UpsertOutcome::Existing(existing));
        }
        let created = self
            .store
            .create(
                kind,
                NewRecord::Named {
                    name: name.to_string(),
                    slug,
                },
            )
            .await?;
        debug!(%kind, name, id = created.id, "created related entity");
        Ok(UpsertOutcome::Created(created.reference()))
    }
}
