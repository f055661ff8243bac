//! In-process [`Store`] used by `--dry-run` and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::store::{
    BinaryAttachment, EntityKind, GameDraft, NewRecord, RecordRef, Store, StoreError, StoredFile,
    StoredRecord,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    records: Vec<StoredRecord>,
    games: HashMap<i64, GameDraft>,
    files: Vec<StoredFile>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock().records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn count_named(&self, kind: EntityKind, name: &str) -> usize {
        self.lock()
            .records
            .iter()
            .filter(|r| r.kind == kind && r.name == name)
            .count()
    }

    pub fn game(&self, name: &str) -> Option<(StoredRecord, GameDraft)> {
        let state = self.lock();
        let record = state
            .records
            .iter()
            .find(|r| r.kind == EntityKind::Game && r.name == name)?
            .clone();
        let draft = state.games.get(&record.id)?.clone();
        Some((record, draft))
    }

    pub fn files_for(&self, target: RecordRef) -> Vec<StoredFile> {
        self.lock()
            .files
            .iter()
            .filter(|f| f.target == target)
            .cloned()
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    pub fn total_records(&self) -> usize {
        self.lock().records.len()
    }

    /// Seed a record directly, bypassing the pipeline.
    pub fn insert(&self, kind: EntityKind, name: &str) -> StoredRecord {
        let mut state = self.lock();
        state.next_id += 1;
        let record = StoredRecord {
            id: state.next_id,
            kind,
            name: name.to_string(),
            slug: crate::normalization::normalize(name),
        };
        state.records.push(record.clone());
        record
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let found = self
            .lock()
            .records
            .iter()
            .filter(|r| r.kind == kind && r.name == name)
            .cloned()
            .collect();
        // Yield like a real round-trip so unserialized find-then-create would interleave.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn create(&self, kind: EntityKind, data: NewRecord) -> Result<StoredRecord, StoreError> {
        if !data.fits(kind) {
            return Err(StoreError::ShapeMismatch {
                kind,
                shape: match data {
                    NewRecord::Named { .. } => "named",
                    NewRecord::Game(_) => "game",
                },
            });
        }
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let NewRecord::Game(draft) = &data {
            for rel in draft.relations.iter() {
                if !state
                    .records
                    .iter()
                    .any(|r| r.kind == rel.kind && r.id == rel.id)
                {
                    return Err(StoreError::MissingTarget(*rel));
                }
            }
        }
        state.next_id += 1;
        let record = StoredRecord {
            id: state.next_id,
            kind,
            name: data.name().to_string(),
            slug: data.slug().to_string(),
        };
        state.records.push(record.clone());
        if let NewRecord::Game(draft) = data {
            state.games.insert(record.id, *draft);
        }
        Ok(record)
    }

    async fn attach_file(&self, attachment: BinaryAttachment) -> Result<StoredFile, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        let target = attachment.target;
        if !state
            .records
            .iter()
            .any(|r| r.kind == target.kind && r.id == target.id)
        {
            return Err(StoreError::MissingTarget(target));
        }
        // Mirrors the unique (target, field, position) index of the Postgres schema.
        if state.files.iter().any(|f| {
            f.target == target && f.field == attachment.field && f.position == attachment.position
        }) {
            return Err(StoreError::SlotTaken {
                target,
                field: attachment.field,
                position: attachment.position,
            });
        }
        state.next_id += 1;
        let file = StoredFile {
            id: state.next_id,
            stored_name: attachment.stored_name,
            target,
            field: attachment.field,
            position: attachment.position,
        };
        state.files.push(file.clone());
        Ok(file)
    }
}
