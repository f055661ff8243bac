//! Store contract consumed by the sync pipeline.
//!
//! The store owns every persisted record. The pipeline only ever finds records by
//! exact name, creates new ones and attaches binary files to them.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalization::AgeRating;

/// Closed set of collections the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Developer,
    Publisher,
    Category,
    Platform,
    Game,
}

impl EntityKind {
    /// Relation kinds, in the order the pipeline reports them.
    pub const RELATIONS: [EntityKind; 4] = [
        EntityKind::Developer,
        EntityKind::Publisher,
        EntityKind::Category,
        EntityKind::Platform,
    ];

    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Developer => "developers",
            EntityKind::Publisher => "publishers",
            EntityKind::Category => "categories",
            EntityKind::Platform => "platforms",
            EntityKind::Game => "games",
        }
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, EntityKind::Game)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Reference to a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: EntityKind,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    pub slug: String,
}

impl StoredRecord {
    pub fn reference(&self) -> RecordRef {
        RecordRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// Relation references attached to a game at creation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameRelations {
    pub developers: Vec<RecordRef>,
    pub publishers: Vec<RecordRef>,
    pub categories: Vec<RecordRef>,
    pub platforms: Vec<RecordRef>,
}

impl GameRelations {
    pub fn refs_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<RecordRef>> {
        match kind {
            EntityKind::Developer => Some(&mut self.developers),
            EntityKind::Publisher => Some(&mut self.publishers),
            EntityKind::Category => Some(&mut self.categories),
            EntityKind::Platform => Some(&mut self.platforms),
            EntityKind::Game => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordRef> {
        self.developers
            .iter()
            .chain(&self.publishers)
            .chain(&self.categories)
            .chain(&self.platforms)
    }
}

/// Field values for a new game record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDraft {
    pub name: String,
    pub slug: String,
    pub price: f64,
    pub currency: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub age_rating: AgeRating,
    pub relations: GameRelations,
}

/// Creation payload; the shape must match the target [`EntityKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewRecord {
    Named { name: String, slug: String },
    Game(Box<GameDraft>),
}

impl NewRecord {
    pub fn name(&self) -> &str {
        match self {
            NewRecord::Named { name, .. } => name,
            NewRecord::Game(draft) => &draft.name,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            NewRecord::Named { slug, .. } => slug,
            NewRecord::Game(draft) => &draft.slug,
        }
    }

    pub fn fits(&self, kind: EntityKind) -> bool {
        match self {
            NewRecord::Named { .. } => kind.is_relation(),
            NewRecord::Game(_) => kind == EntityKind::Game,
        }
    }
}

/// Record field a binary asset is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetField {
    /// Single-valued.
    Cover,
    /// Multi-valued, ordered by attach time.
    Gallery,
}

impl AssetField {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetField::Cover => "cover",
            AssetField::Gallery => "gallery",
        }
    }
}

impl fmt::Display for AssetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetched binary ready to be bound to a record field.
#[derive(Debug, Clone)]
pub struct BinaryAttachment {
    pub content: Bytes,
    pub mime: String,
    pub ext: String,
    pub size: u64,
    /// Name derived from the target's slug, e.g. `outer-wilds.jpg`.
    pub filename: String,
    /// Collision-resistant storage name, e.g. `outer-wilds_a8Fk2LmQ0z.jpg`.
    pub stored_name: String,
    pub target: RecordRef,
    pub field: AssetField,
    /// Slot within `field`; `0` for a cover, catalog order for gallery images.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub stored_name: String,
    pub target: RecordRef,
    pub field: AssetField,
    pub position: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{kind} cannot be created from a {shape} payload")]
    ShapeMismatch {
        kind: EntityKind,
        shape: &'static str,
    },
    #[error("{0} does not exist")]
    MissingTarget(RecordRef),
    #[error("{target} already has a {field} file at position {position}")]
    SlotTaken {
        target: RecordRef,
        field: AssetField,
        position: u32,
    },
    #[error("store call `{op}` timed out")]
    Timeout { op: &'static str },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Every record of `kind` whose name equals `name` exactly, in store order.
    async fn find_by_name(&self, kind: EntityKind, name: &str)
        -> Result<Vec<StoredRecord>, StoreError>;

    async fn create(&self, kind: EntityKind, data: NewRecord) -> Result<StoredRecord, StoreError>;

    async fn attach_file(&self, attachment: BinaryAttachment) -> Result<StoredFile, StoreError>;
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}
