use std::collections::BTreeSet;

use super::CatalogItem;
use crate::database_ops::store::EntityKind;

/// Distinct relation names found on a batch of catalog items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationNames {
    pub developers: BTreeSet<String>,
    pub publishers: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
}

impl RelationNames {
    pub fn names(&self, kind: EntityKind) -> Option<&BTreeSet<String>> {
        match kind {
            EntityKind::Developer => Some(&self.developers),
            EntityKind::Publisher => Some(&self.publishers),
            EntityKind::Category => Some(&self.categories),
            EntityKind::Platform => Some(&self.platforms),
            EntityKind::Game => None,
        }
    }

    /// Every `(kind, name)` pair, one per distinct name within a kind.
    pub fn pairs(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        EntityKind::RELATIONS.into_iter().flat_map(move |kind| {
            self.names(kind)
                .into_iter()
                .flatten()
                .map(move |n| (kind, n.as_str()))
        })
    }
}

/// Names a single item references for one relation kind, in item order.
pub fn item_names(item: &CatalogItem, kind: EntityKind) -> Vec<String> {
    let names: Vec<&str> = match kind {
        EntityKind::Developer => item.developers.iter().flatten().map(String::as_str).collect(),
        EntityKind::Publisher => item.publishers.iter().flatten().map(String::as_str).collect(),
        EntityKind::Category => item.genre_names().collect(),
        EntityKind::Platform => item
            .operating_systems
            .iter()
            .flatten()
            .map(String::as_str)
            .collect(),
        EntityKind::Game => Vec::new(),
    };
    let mut seen = BTreeSet::new();
    names
        .into_iter()
        .filter(|n| !n.trim().is_empty())
        .filter(|n| seen.insert(*n))
        .map(str::to_string)
        .collect()
}

/// Collect the distinct relation names across `items`. Names are compared exactly
/// (case-sensitive); absent relation lists contribute nothing.
pub fn aggregate(items: &[CatalogItem]) -> RelationNames {
    let mut out = RelationNames::default();
    for item in items {
        out.developers.extend(item_names(item, EntityKind::Developer));
        out.publishers.extend(item_names(item, EntityKind::Publisher));
        out.categories.extend(item_names(item, EntityKind::Category));
        out.platforms.extend(item_names(item, EntityKind::Platform));
    }
    out
}
