pub mod aggregate;
pub mod client;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub use aggregate::{aggregate, RelationNames};
pub use client::{CatalogClient, CatalogQuery};

/// One page of the remote catalog. Never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub products: Vec<CatalogItem>,
    /// Products that could not be decoded and were dropped from `products`.
    pub rejected: usize,
    pub pages: Option<u32>,
    pub total: Option<u64>,
    /// Filter facets; not consumed by the pipeline.
    pub filters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageEnvelope {
    #[serde(default)]
    products: Option<Vec<Value>>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default, alias = "productCount")]
    total: Option<u64>,
    #[serde(default)]
    filters: Option<Value>,
}

impl CatalogPage {
    /// Decode a catalog response. Only a malformed envelope is an error; each
    /// product is decoded on its own and undecodable ones are logged and counted.
    pub fn from_value(body: Value) -> Result<Self, serde_json::Error> {
        let envelope: PageEnvelope = serde_json::from_value(body)?;
        let mut products = Vec::new();
        let mut rejected = 0;
        for (index, raw) in envelope.products.unwrap_or_default().into_iter().enumerate() {
            match serde_json::from_value::<CatalogItem>(raw) {
                Ok(item) => products.push(item),
                Err(err) => {
                    rejected += 1;
                    warn!(index, error = %err, "catalog product rejected");
                }
            }
        }
        Ok(Self {
            products,
            rejected,
            pages: envelope.pages,
            total: envelope.total,
            filters: envelope.filters,
        })
    }

    /// Products on the page, decoded or not.
    pub fn len(&self) -> usize {
        self.products.len() + self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub slug: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub price: Option<CatalogPrice>,
    #[serde(default, alias = "coverHorizontal")]
    pub cover_url: Option<String>,
    #[serde(default, alias = "screenshots", deserialize_with = "lenient_strings")]
    pub gallery_urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub developers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub publishers: Option<Vec<String>>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub operating_systems: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Genre {
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogPrice {
    #[serde(default, rename = "finalMoney", alias = "final_money")]
    pub final_money: Option<Money>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Money {
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
}

impl CatalogItem {
    /// Final price amount, `0.0` when missing or unparsable.
    pub fn price_amount(&self) -> f64 {
        self.price
            .as_ref()
            .and_then(|p| p.final_money.as_ref())
            .and_then(|m| m.amount.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn price_currency(&self) -> Option<String> {
        self.price
            .as_ref()
            .and_then(|p| p.final_money.as_ref())
            .and_then(|m| m.currency.clone())
    }

    pub fn release_date(&self) -> Option<NaiveDate> {
        self.release_date.as_deref().and_then(parse_release_date)
    }

    /// Gallery URLs in catalog order, blanks dropped, at most `limit`.
    pub fn gallery(&self, limit: usize) -> Vec<&str> {
        self.gallery_urls
            .iter()
            .flatten()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .take(limit)
            .collect()
    }

    pub fn genre_names(&self) -> impl Iterator<Item = &str> {
        self.genres.iter().flatten().map(|g| g.name.as_str())
    }
}

/// Accepts `2019.05.28`, `2019-05-28` and RFC 3339 timestamps.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%Y.%m.%d", "%Y-%m-%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// A list of strings where `null` and non-string entries are dropped.
fn lenient_strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.map(|values| {
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()
    }))
}
