use std::sync::Arc;
use tracing::debug;

use super::store::{EntityKind, RecordRef, Store, StoreError};

/// Exact-name lookup within one collection.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn Store>,
}

impl Resolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when no record carries `name`; `Err` when the store could not answer.
    ///
    /// With duplicates present the store's first row wins; callers must not rely on which.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<RecordRef>, StoreError> {
        let matches = self.store.find_by_name(kind, name).await?;
        if matches.len() > 1 {
            debug!(%kind, name, count = matches.len(), "duplicate records share a name");
        }
        Ok(matches.first().map(|r| r.reference()))
    }

    /// Resolve many names of one kind concurrently, keeping only the hits.
    ///
    /// Absent names and lookup failures are returned separately so the caller can
    /// log and count them.
    pub async fn resolve_all(&self, kind: EntityKind, names: &[String]) -> ResolvedSet {
        let lookups = names.iter().map(|name| async move {
            (name.as_str(), self.resolve(kind, name).await)
        });
        let mut out = ResolvedSet::default();
        for (name, result) in futures::future::join_all(lookups).await {
            match result {
                Ok(Some(r)) => out.found.push(r),
                Ok(None) => out.missing.push(name.to_string()),
                Err(err) => out.failed.push((name.to_string(), err)),
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSet {
    pub found: Vec<RecordRef>,
    pub missing: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}
