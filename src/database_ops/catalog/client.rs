use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::CatalogPage;
use crate::util::http::HttpFetch;

pub const DEFAULT_LIMIT: u32 = 48;
pub const DEFAULT_ORDER: &str = "trending:desc";

/// Pagination, sort and filter options for one catalog fetch.
///
/// Unrecognized keys are forwarded to the catalog verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogQuery {
    pub limit: u32,
    pub order: String,
    pub extra: BTreeMap<String, String>,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            order: DEFAULT_ORDER.to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl CatalogQuery {
    /// Merge raw query pairs over the defaults. An unparsable or zero `limit`
    /// keeps the default; a blank `order` keeps the default.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (k, v) in pairs {
            let (k, v): (String, String) = (k.into(), v.into());
            match k.as_str() {
                "limit" => {
                    if let Some(limit) = v.trim().parse::<u32>().ok().filter(|l| *l > 0) {
                        query.limit = limit;
                    }
                }
                "order" => {
                    if !v.trim().is_empty() {
                        query.order = v;
                    }
                }
                _ => {
                    query.extra.insert(k, v);
                }
            }
        }
        query
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self::from_pairs(map)
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("limit".to_string(), self.limit.to_string()),
            ("order".to_string(), self.order.clone()),
        ];
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

pub struct CatalogClient {
    fetch: Arc<dyn HttpFetch>,
    base_url: String,
}

impl CatalogClient {
    pub fn new(fetch: Arc<dyn HttpFetch>, base_url: &str) -> Self {
        Self {
            fetch,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self), fields(limit = query.limit, order = %query.order))]
    pub async fn fetch_page(&self, query: &CatalogQuery) -> Result<CatalogPage> {
        let body = self
            .fetch
            .get_json(&self.base_url, &query.to_pairs())
            .await
            .context("catalog fetch failed")?;
        let page =
            CatalogPage::from_value(body).context("catalog response is not a catalog page")?;
        info!(
            products = page.products.len(),
            rejected = page.rejected,
            pages = ?page.pages,
            total = ?page.total,
            "catalog page fetched"
        );
        debug!(has_filters = page.filters.is_some(), "catalog facets ignored");
        Ok(page)
    }
}
