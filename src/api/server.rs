// API server implementation using actix-web

use crate::api::{middleware, routes};
use crate::database_ops::CatalogSynchronizer;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub sync: Arc<CatalogSynchronizer>,
    pub store_backend: &'static str,
    pub started: Instant,
}

impl AppState {
    pub fn new(sync: CatalogSynchronizer, store_backend: &'static str) -> Self {
        Self {
            sync: Arc::new(sync),
            store_backend,
            started: Instant::now(),
        }
    }
}

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        use crate::util::env::{env_opt, env_parse};

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_opt("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .trim()
            .parse()
            .context("Invalid API_PORT")?;
        let allowed_origins: String = env_parse(
            "ALLOWED_ORIGINS",
            "http://localhost:3000,http://localhost:8000".to_string(),
        );

        Ok(Self {
            host,
            port,
            allowed_origins,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, state: AppState) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            store = state.store_backend,
            "Starting catalog sync API server"
        );

        let state = web::Data::new(state);
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
