use anyhow::{anyhow, Context, Result};
use clap::Parser;
use game_catalog_sync::database_ops::catalog::client::{DEFAULT_LIMIT, DEFAULT_ORDER};
use game_catalog_sync::database_ops::memory_store::MemoryStore;
use game_catalog_sync::database_ops::pg_store::PgStore;
use game_catalog_sync::database_ops::Store;
use game_catalog_sync::util::env as env_util;
use game_catalog_sync::util::http::ReqwestFetch;
use game_catalog_sync::{CatalogQuery, CatalogSynchronizer, SyncConfig};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "game-catalog-sync",
    version,
    about = "Populate the store from one page of the remote game catalog"
)]
struct Cli {
    /// Catalog page size
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,
    /// Catalog sort order
    #[arg(long, default_value = DEFAULT_ORDER)]
    order: String,
    /// Extra catalog query parameter forwarded verbatim (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Run against an in-memory store; nothing is persisted
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Optional override for the database URL
    #[arg(long)]
    db_url: Option<String>,
    /// Print the run summary as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn parse_param(raw: &str) -> Result<(String, String)> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got `{raw}`"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(anyhow!("empty parameter name in `{raw}`"));
    }
    Ok((k.to_string(), v.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    game_catalog_sync::tracing::init_tracing(game_catalog_sync::tracing::DEFAULT_FILTER)?;
    let cli = Cli::parse();

    let config = SyncConfig::from_env()?;
    let fetch = Arc::new(ReqwestFetch::new(config.http_timeout, &config.user_agent)?);
    let store: Arc<dyn Store> = if cli.dry_run {
        info!("dry run: using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(PgStore::connect(cli.db_url.clone()).await?)
    };

    let mut pairs = vec![
        ("limit".to_string(), cli.limit.to_string()),
        ("order".to_string(), cli.order.clone()),
    ];
    pairs.extend(cli.params.iter().cloned());
    let query = CatalogQuery::from_pairs(pairs);

    let sync = CatalogSynchronizer::new(store, fetch, &config);
    let summary = sync.run(&query).await.context("catalog sync failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            games_created = summary.games_created,
            games_skipped = summary.games_skipped,
            assets_attached = summary.assets_attached,
            "Populate finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_split_on_first_equals() {
        assert_eq!(
            parse_param("productType=in:game,pack").unwrap(),
            ("productType".to_string(), "in:game,pack".to_string())
        );
        assert_eq!(parse_param("q=a=b").unwrap().1, "a=b");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["game-catalog-sync", "--param", "page=2", "--dry-run"]).unwrap();
        assert_eq!(cli.limit, 48);
        assert_eq!(cli.order, "trending:desc");
        assert_eq!(cli.params, vec![("page".to_string(), "2".to_string())]);
        assert!(cli.dry_run);
    }
}
