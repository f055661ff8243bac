// Catalog ingestion, store access and the sync pipeline that ties them together.

pub mod catalog;
pub mod details;
pub mod media_upload;
pub mod memory_store;
pub mod pg_store;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod timed_store;
pub mod upsert;

pub use store::{EntityKind, RecordRef, Store, StoreError};
pub use sync::{CatalogSynchronizer, SyncConfig, SyncSummary};
