pub mod api;
pub mod database_ops;
pub mod normalization;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
    pub mod http;
}

pub use database_ops::catalog::CatalogQuery;
pub use database_ops::{CatalogSynchronizer, SyncConfig, SyncSummary};
