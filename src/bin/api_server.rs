// HTTP API server binary for the catalog sync trigger

use anyhow::Result;
use game_catalog_sync::api::{ApiServer, AppState};
use game_catalog_sync::database_ops::memory_store::MemoryStore;
use game_catalog_sync::database_ops::pg_store::PgStore;
use game_catalog_sync::database_ops::Store;
use game_catalog_sync::util::env as env_util;
use game_catalog_sync::util::http::ReqwestFetch;
use game_catalog_sync::{CatalogSynchronizer, SyncConfig};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    game_catalog_sync::tracing::init_tracing(game_catalog_sync::tracing::DEFAULT_FILTER)?;

    tracing::info!("Initializing catalog sync API server");

    // Missing catalog/details URLs fail here, before the server binds.
    let config = SyncConfig::from_env()?;
    let server = ApiServer::from_env()?;

    let (store, backend): (Arc<dyn Store>, &'static str) = if env_util::env_flag("API_DRY_RUN", false) {
        tracing::warn!("API_DRY_RUN set: populate writes to an in-memory store");
        (Arc::new(MemoryStore::new()), "memory")
    } else {
        let store = PgStore::connect(None).await?;
        tracing::info!("Database connected successfully");
        (Arc::new(store), "postgres")
    };

    let fetch = Arc::new(ReqwestFetch::new(config.http_timeout, &config.user_agent)?);
    let sync = CatalogSynchronizer::new(store, fetch, &config);

    server.run(AppState::new(sync, backend)).await?;

    Ok(())
}
