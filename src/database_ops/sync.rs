//! Catalog → store synchronization.
//!
//! One run: fetch a catalog page, upsert every distinct relation name, then create
//! each game that is not already stored and attach its images. Only the catalog
//! fetch can fail a run; every later failure is logged, counted in
//! [`SyncSummary`] and confined to its own unit of work.

use anyhow::Result;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use super::catalog::aggregate::item_names;
use super::catalog::{aggregate, CatalogClient, CatalogItem, CatalogQuery, RelationNames};
use super::details::{DetailsScraper, GameDetails};
use super::media_upload::AssetUploader;
use super::resolver::Resolver;
use super::store::{
    AssetField, EntityKind, GameDraft, GameRelations, NewRecord, RecordRef, Store,
};
use super::timed_store::TimedStore;
use super::upsert::{KeyedLocks, UpsertOutcome, Upserter};
use crate::normalization::slug::from_source_slug;
use crate::util::env::{env_opt, env_parse, preflight_check};
use crate::util::http::HttpFetch;

pub const DEFAULT_GALLERY_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub catalog_url: String,
    pub details_url: String,
    pub http_timeout: Duration,
    pub store_timeout: Duration,
    pub item_concurrency: usize,
    pub gallery_limit: usize,
    pub user_agent: String,
}

impl SyncConfig {
    /// `CATALOG_URL` and `DETAILS_URL` are required; their absence is a startup error.
    pub fn from_env() -> Result<Self> {
        preflight_check(
            "catalog-sync",
            &["CATALOG_URL", "DETAILS_URL"],
            &[
                "CATALOG_URL",
                "DETAILS_URL",
                "HTTP_TIMEOUT_SECS",
                "STORE_TIMEOUT_SECS",
                "SYNC_ITEM_CONCURRENCY",
                "SYNC_GALLERY_LIMIT",
            ],
        )?;
        Ok(Self {
            catalog_url: env_opt("CATALOG_URL").unwrap_or_default(),
            details_url: env_opt("DETAILS_URL").unwrap_or_default(),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 20u64)),
            store_timeout: Duration::from_secs(env_parse("STORE_TIMEOUT_SECS", 15u64)),
            item_concurrency: env_parse("SYNC_ITEM_CONCURRENCY", 16usize).max(1),
            gallery_limit: env_parse("SYNC_GALLERY_LIMIT", DEFAULT_GALLERY_LIMIT),
            user_agent: env_opt("HTTP_USER_AGENT")
                .unwrap_or_else(|| format!("game-catalog-sync/{}", env!("CARGO_PKG_VERSION"))),
        })
    }

    pub fn new(catalog_url: &str, details_url: &str) -> Self {
        Self {
            catalog_url: catalog_url.to_string(),
            details_url: details_url.to_string(),
            http_timeout: Duration::from_secs(20),
            store_timeout: Duration::from_secs(15),
            item_concurrency: 16,
            gallery_limit: DEFAULT_GALLERY_LIMIT,
            user_agent: format!("game-catalog-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-stage counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub products: usize,
    pub relations_created: usize,
    pub relations_existing: usize,
    pub relations_failed: usize,
    pub games_created: usize,
    pub games_skipped: usize,
    pub games_failed: usize,
    pub relation_refs_unresolved: usize,
    pub metadata_fetched: usize,
    pub metadata_missing: usize,
    pub assets_attached: usize,
    pub assets_failed: usize,
    pub elapsed_ms: u64,
}

impl SyncSummary {
    /// True when nothing was dropped along the way.
    pub fn is_clean(&self) -> bool {
        self.relations_failed == 0
            && self.games_failed == 0
            && self.relation_refs_unresolved == 0
            && self.metadata_missing == 0
            && self.assets_failed == 0
    }

    fn absorb(&mut self, report: ItemReport) {
        match report.outcome {
            ItemOutcome::Skipped => self.games_skipped += 1,
            ItemOutcome::Failed => self.games_failed += 1,
            ItemOutcome::Created => self.games_created += 1,
        }
        self.relation_refs_unresolved += report.unresolved;
        match report.metadata {
            Some(true) => self.metadata_fetched += 1,
            Some(false) => self.metadata_missing += 1,
            None => {}
        }
        self.assets_attached += report.assets_attached;
        self.assets_failed += report.assets_failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Created,
    Skipped,
    Failed,
}

#[derive(Debug)]
struct ItemReport {
    outcome: ItemOutcome,
    unresolved: usize,
    /// `None` when the item never reached the metadata step.
    metadata: Option<bool>,
    assets_attached: usize,
    assets_failed: usize,
}

impl ItemReport {
    fn ended(outcome: ItemOutcome) -> Self {
        Self {
            outcome,
            unresolved: 0,
            metadata: None,
            assets_attached: 0,
            assets_failed: 0,
        }
    }
}

pub struct CatalogSynchronizer {
    catalog: CatalogClient,
    details: DetailsScraper,
    store: Arc<dyn Store>,
    resolver: Resolver,
    upserter: Upserter,
    uploader: AssetUploader,
    locks: Arc<KeyedLocks>,
    item_concurrency: usize,
    gallery_limit: usize,
}

impl CatalogSynchronizer {
    /// Every store call made by the pipeline is bounded by `config.store_timeout`.
    pub fn new(store: Arc<dyn Store>, fetch: Arc<dyn HttpFetch>, config: &SyncConfig) -> Self {
        let store: Arc<dyn Store> = Arc::new(TimedStore::new(store, config.store_timeout));
        let locks = Arc::new(KeyedLocks::new());
        Self {
            catalog: CatalogClient::new(fetch.clone(), &config.catalog_url),
            details: DetailsScraper::new(fetch.clone(), &config.details_url),
            resolver: Resolver::new(store.clone()),
            upserter: Upserter::new(store.clone(), locks.clone()),
            uploader: AssetUploader::new(fetch, store.clone()),
            store,
            locks,
            item_concurrency: config.item_concurrency.max(1),
            gallery_limit: config.gallery_limit,
        }
    }

    /// Run one synchronization. `Err` only when the catalog page cannot be fetched.
    #[instrument(skip(self), fields(limit = query.limit, order = %query.order))]
    pub async fn run(&self, query: &CatalogQuery) -> Result<SyncSummary> {
        let started = Instant::now();
        let page = self.catalog.fetch_page(query).await?;

        let mut summary = SyncSummary {
            products: page.len(),
            games_failed: page.rejected,
            ..Default::default()
        };
        if page.is_empty() {
            info!("catalog page has no products");
        }

        let names = aggregate(&page.products);
        info!(
            developers = names.developers.len(),
            publishers = names.publishers.len(),
            categories = names.categories.len(),
            platforms = names.platforms.len(),
            "relations aggregated"
        );
        // Must finish before any item resolves its relation references.
        self.upsert_relations(&names, &mut summary).await;

        let reports: Vec<ItemReport> = stream::iter(page.products.iter())
            .map(|item| self.sync_item(item))
            .buffer_unordered(self.item_concurrency)
            .collect()
            .await;
        for report in reports {
            summary.absorb(report);
        }

        self.locks.prune();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        if summary.is_clean() {
            info!(?summary, "catalog sync finished");
        } else {
            warn!(?summary, "catalog sync finished with dropped work");
        }
        Ok(summary)
    }

    async fn upsert_relations(&self, names: &RelationNames, summary: &mut SyncSummary) {
        let calls = names.pairs().map(|(kind, name)| async move {
            (kind, name, self.upserter.ensure_exists(kind, name).await)
        });
        for (kind, name, result) in futures::future::join_all(calls).await {
            match result {
                Ok(UpsertOutcome::Created(_)) => summary.relations_created += 1,
                Ok(UpsertOutcome::Existing(_)) => summary.relations_existing += 1,
                Err(err) => {
                    summary.relations_failed += 1;
                    warn!(%kind, name, error = %err, "relation upsert failed");
                }
            }
        }
    }

    async fn sync_item(&self, item: &CatalogItem) -> ItemReport {
        // Titles are matched and stored exactly as the catalog spells them.
        let title = item.title.as_str();
        if title.trim().is_empty() {
            warn!(id = %item.id, slug = %item.slug, "catalog item has no title; skipping");
            return ItemReport::ended(ItemOutcome::Failed);
        }

        // Held until the game exists so duplicate titles in one page create once.
        let guard = self.locks.acquire(EntityKind::Game, title).await;
        match self.resolver.resolve(EntityKind::Game, title).await {
            Ok(Some(existing)) => {
                info!(title, id = existing.id, "game already stored; skipping");
                return ItemReport::ended(ItemOutcome::Skipped);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(title, error = %err, "game lookup failed");
                return ItemReport::ended(ItemOutcome::Failed);
            }
        }

        let slug = from_source_slug(&item.slug, title);
        let detail_slug = if item.slug.trim().is_empty() {
            slug.as_str()
        } else {
            item.slug.as_str()
        };
        let ((relations, unresolved), details) = tokio::join!(
            self.resolve_relations(item, title),
            self.fetch_details(detail_slug, title)
        );

        let mut report = ItemReport {
            unresolved,
            metadata: Some(details.is_some()),
            ..ItemReport::ended(ItemOutcome::Created)
        };
        let draft = build_draft(item, title, &slug, relations, details);
        let game = match self.store.create(EntityKind::Game, NewRecord::Game(Box::new(draft))).await {
            Ok(game) => game,
            Err(err) => {
                warn!(title, error = %err, "game creation failed");
                report.outcome = ItemOutcome::Failed;
                return report;
            }
        };
        drop(guard);
        info!(title, id = game.id, "game created");

        let (attached, failed) = self.attach_assets(item, game.reference(), &game.slug).await;
        report.assets_attached = attached;
        report.assets_failed = failed;
        report
    }

    /// References for every relation name on `item`, resolved concurrently per kind.
    /// Names that cannot be resolved are left off the game and counted.
    async fn resolve_relations(&self, item: &CatalogItem, title: &str) -> (GameRelations, usize) {
        let lookups = EntityKind::RELATIONS.map(|kind| {
            let names = item_names(item, kind);
            async move { (kind, self.resolver.resolve_all(kind, &names).await) }
        });
        let mut relations = GameRelations::default();
        let mut unresolved = 0;
        for (kind, set) in futures::future::join_all(lookups).await {
            for name in &set.missing {
                warn!(title, %kind, name = %name, "relation missing after upsert");
            }
            for (name, err) in &set.failed {
                warn!(title, %kind, name = %name, error = %err, "relation lookup failed");
            }
            unresolved += set.missing.len() + set.failed.len();
            if let Some(refs) = relations.refs_mut(kind) {
                *refs = set.found;
            }
        }
        (relations, unresolved)
    }

    async fn fetch_details(&self, slug: &str, title: &str) -> Option<GameDetails> {
        match self.details.fetch_details(slug).await {
            Ok(details) => Some(details),
            Err(err) => {
                warn!(title, slug, error = %err, "metadata fetch failed; creating without it");
                None
            }
        }
    }

    /// Cover plus up to `gallery_limit` gallery images, each isolated from the others.
    async fn attach_assets(&self, item: &CatalogItem, target: RecordRef, slug: &str) -> (usize, usize) {
        let cover = item
            .cover_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| (u, AssetField::Cover, 0));
        let gallery = item
            .gallery(self.gallery_limit)
            .into_iter()
            .zip(0u32..)
            .map(|(u, position)| (u, AssetField::Gallery, position));
        let jobs: Vec<(&str, AssetField, u32)> = cover.into_iter().chain(gallery).collect();

        // Positions are fixed up front so concurrent attaches never race for a slot.
        let uploads = jobs.into_iter().map(|(url, field, position)| async move {
            (
                url,
                field,
                self.uploader.attach(url, target, slug, field, position).await,
            )
        });
        let mut attached = 0;
        let mut failed = 0;
        for (url, field, result) in futures::future::join_all(uploads).await {
            match result {
                Ok(_) => attached += 1,
                Err(err) => {
                    failed += 1;
                    warn!(
                        %target,
                        %field,
                        url,
                        configuration = err.is_configuration(),
                        error = %err,
                        "asset attach failed"
                    );
                }
            }
        }
        (attached, failed)
    }
}

fn build_draft(
    item: &CatalogItem,
    title: &str,
    slug: &str,
    relations: GameRelations,
    details: Option<GameDetails>,
) -> GameDraft {
    let (description, short_description, age_rating) = match details {
        Some(d) => (Some(d.description), Some(d.short_description), d.age_rating),
        None => (None, None, Default::default()),
    };
    GameDraft {
        name: title.to_string(),
        slug: slug.to_string(),
        price: item.price_amount(),
        currency: item.price_currency(),
        release_date: item.release_date(),
        description,
        short_description,
        age_rating,
        relations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory_store::MemoryStore;
    use crate::normalization::AgeRating;
    use crate::database_ops::store::{
        BinaryAttachment, StoreError, StoredFile, StoredRecord,
    };
    use crate::util::http::stub::{Canned, StubFetch};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// [`MemoryStore`] that fails `find_by_name` or `create` for one `(kind, name)`.
    struct FailingStore {
        inner: Arc<MemoryStore>,
        fail_find: Option<(EntityKind, &'static str)>,
        fail_create: Option<(EntityKind, &'static str)>,
    }

    impl FailingStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                fail_find: None,
                fail_create: None,
            }
        }

        fn refuse(op: &'static str) -> StoreError {
            StoreError::Timeout { op }
        }
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn find_by_name(
            &self,
            kind: EntityKind,
            name: &str,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            if self.fail_find == Some((kind, name)) {
                return Err(Self::refuse("find"));
            }
            self.inner.find_by_name(kind, name).await
        }

        async fn create(&self, kind: EntityKind, data: NewRecord) -> Result<StoredRecord, StoreError> {
            if self.fail_create == Some((kind, data.name())) {
                return Err(Self::refuse("create"));
            }
            self.inner.create(kind, data).await
        }

        async fn attach_file(&self, attachment: BinaryAttachment) -> Result<StoredFile, StoreError> {
            self.inner.attach_file(attachment).await
        }
    }

    fn celeste() -> Value {
        json!({"id": 2, "title": "Celeste", "slug": "celeste", "genres": [{"name": "Adventure"}]})
    }

    fn with_celeste(fetch: StubFetch) -> StubFetch {
        fetch.route(CATALOG, catalog(vec![outer_wilds(), celeste()]))
    }

    const CATALOG: &str = "https://catalog.test/v1/catalog";
    const DETAILS: &str = "https://details.test/game";

    fn config() -> SyncConfig {
        SyncConfig::new(CATALOG, DETAILS)
    }

    fn outer_wilds() -> Value {
        json!({
            "id": "1",
            "slug": "outer_wilds",
            "title": "Outer Wilds",
            "releaseDate": "2020.06.18",
            "price": {"finalMoney": {"amount": "24.99", "currency": "USD"}},
            "coverHorizontal": "https://img.test/ow-cover.jpg",
            "screenshots": ["https://img.test/ow-1.jpg", "https://img.test/ow-2.jpg"],
            "developers": ["Mobius Digital"],
            "publishers": null,
            "genres": [{"name": "Adventure", "slug": "adventure"}],
            "operatingSystems": null
        })
    }

    fn detail_page(rating: Option<&str>) -> String {
        let icon = rating
            .map(|r| format!(r##"<span class="age-restrictions__icon"><svg><use xlink:href="#{r}"></use></svg></span>"##))
            .unwrap_or_default();
        format!(r#"<html><body>{icon}<div class="description">A solar system stuck in a 22-minute loop.</div></body></html>"#)
    }

    fn catalog(products: Vec<Value>) -> Canned {
        Canned::Json(json!({"pages": 1, "productCount": products.len(), "products": products}))
    }

    fn outer_wilds_fetch() -> StubFetch {
        StubFetch::new()
            .route(CATALOG, catalog(vec![outer_wilds()]))
            .route(
                &format!("{DETAILS}/outer_wilds"),
                Canned::Text(detail_page(None)),
            )
            .image("https://img.test/ow-cover.jpg")
            .image("https://img.test/ow-1.jpg")
            .image("https://img.test/ow-2.jpg")
    }

    #[tokio::test]
    async fn first_run_creates_everything_second_run_nothing() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(outer_wilds_fetch());
        let sync = CatalogSynchronizer::new(store.clone(), fetch.clone(), &config());

        let first = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(first.games_created, 1);
        assert_eq!(first.relations_created, 2);
        assert_eq!(first.assets_attached, 3);
        assert!(first.is_clean());

        assert_eq!(store.count_named(EntityKind::Developer, "Mobius Digital"), 1);
        assert_eq!(store.count_named(EntityKind::Category, "Adventure"), 1);
        let (game, draft) = store.game("Outer Wilds").unwrap();
        assert_eq!(draft.slug, "outer-wilds");
        assert_eq!(draft.price, 24.99);
        assert_eq!(draft.age_rating, AgeRating::Pegi3);
        assert_eq!(draft.relations.developers.len(), 1);
        assert_eq!(draft.relations.categories.len(), 1);
        let files = store.files_for(game.reference());
        assert_eq!(files.iter().filter(|f| f.field == AssetField::Cover).count(), 1);
        assert_eq!(files.iter().filter(|f| f.field == AssetField::Gallery).count(), 2);

        let records_before = store.total_records();
        let files_before = store.file_count();
        let second = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(second.games_created, 0);
        assert_eq!(second.games_skipped, 1);
        assert_eq!(second.relations_created, 0);
        assert_eq!(second.relations_existing, 2);
        assert_eq!(store.total_records(), records_before);
        assert_eq!(store.file_count(), files_before);
    }

    #[tokio::test]
    async fn existing_title_is_skipped_without_asset_calls() {
        let store = Arc::new(MemoryStore::new());
        store.insert(EntityKind::Game, "Outer Wilds");
        let fetch = Arc::new(outer_wilds_fetch());
        let sync = CatalogSynchronizer::new(store.clone(), fetch.clone(), &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_created, 0);
        assert_eq!(summary.games_skipped, 1);
        assert_eq!(store.count(EntityKind::Game), 1);
        assert_eq!(store.file_count(), 0);
        assert_eq!(fetch.hit_count("https://img.test/"), 0);
        assert_eq!(fetch.hit_count(DETAILS), 0);
    }

    #[tokio::test]
    async fn failed_gallery_image_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(
            outer_wilds_fetch().route("https://img.test/ow-1.jpg", Canned::Fail(502)),
        );
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_created, 1);
        assert_eq!(summary.assets_attached, 2);
        assert_eq!(summary.assets_failed, 1);
        assert!(!summary.is_clean());

        let (game, _) = store.game("Outer Wilds").unwrap();
        let files = store.files_for(game.reference());
        assert_eq!(files.iter().filter(|f| f.field == AssetField::Cover).count(), 1);
        assert_eq!(files.iter().filter(|f| f.field == AssetField::Gallery).count(), 1);
    }

    #[tokio::test]
    async fn missing_metadata_still_creates_game() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(
            StubFetch::new()
                .route(CATALOG, catalog(vec![outer_wilds()]))
                .image("https://img.test/ow-cover.jpg")
                .image("https://img.test/ow-1.jpg")
                .image("https://img.test/ow-2.jpg"),
        );
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_created, 1);
        assert_eq!(summary.metadata_missing, 1);
        let (_, draft) = store.game("Outer Wilds").unwrap();
        assert_eq!(draft.description, None);
        assert_eq!(draft.age_rating, AgeRating::Pegi3);
    }

    #[tokio::test]
    async fn scraped_rating_and_description_are_merged() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(outer_wilds_fetch().route(
            &format!("{DETAILS}/outer_wilds"),
            Canned::Text(detail_page(Some("pegi_12"))),
        ));
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());
        sync.run(&CatalogQuery::default()).await.unwrap();

        let (_, draft) = store.game("Outer Wilds").unwrap();
        assert_eq!(draft.age_rating, AgeRating::Pegi12);
        assert_eq!(
            draft.short_description.as_deref(),
            Some("A solar system stuck in a 22-minute loop.")
        );
    }

    #[tokio::test]
    async fn catalog_failure_aborts_the_run() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(StubFetch::new().route(CATALOG, Canned::Fail(503)));
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());
        assert!(sync.run(&CatalogQuery::default()).await.is_err());
        assert_eq!(store.total_records(), 0);
    }

    #[tokio::test]
    async fn shared_relations_and_duplicate_titles_create_once() {
        let mut second = outer_wilds();
        second["id"] = json!("2");
        let mut other = outer_wilds();
        other["id"] = json!("3");
        other["title"] = json!("Outer Wilds: Echoes of the Eye");
        other["slug"] = json!("outer_wilds_echoes_of_the_eye");
        other["screenshots"] = json!([]);
        other["coverHorizontal"] = Value::Null;

        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(
            outer_wilds_fetch()
                .route(CATALOG, catalog(vec![outer_wilds(), second, other]))
                .route(
                    &format!("{DETAILS}/outer_wilds_echoes_of_the_eye"),
                    Canned::Text(detail_page(None)),
                ),
        );
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.products, 3);
        assert_eq!(summary.games_created, 2);
        assert_eq!(summary.games_skipped, 1);
        assert_eq!(store.count_named(EntityKind::Game, "Outer Wilds"), 1);
        assert_eq!(store.count_named(EntityKind::Developer, "Mobius Digital"), 1);
        assert_eq!(summary.relations_created, 2);
    }

    #[tokio::test]
    async fn untitled_items_are_counted_as_failed() {
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(
            StubFetch::new().route(CATALOG, catalog(vec![json!({"id": 9, "title": "  "})])),
        );
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());
        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_failed, 1);
        assert_eq!(store.total_records(), 0);
    }

    #[tokio::test]
    async fn failed_relation_create_spares_siblings_and_the_game() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = FailingStore::new(memory.clone());
        store.fail_create = Some((EntityKind::Developer, "Mobius Digital"));
        let sync = CatalogSynchronizer::new(Arc::new(store), Arc::new(outer_wilds_fetch()), &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.relations_failed, 1);
        assert_eq!(summary.relations_created, 1);
        assert_eq!(summary.relation_refs_unresolved, 1);
        assert_eq!(summary.games_created, 1);
        assert!(!summary.is_clean());

        assert_eq!(memory.count(EntityKind::Developer), 0);
        assert_eq!(memory.count_named(EntityKind::Category, "Adventure"), 1);
        let (_, draft) = memory.game("Outer Wilds").unwrap();
        assert!(draft.relations.developers.is_empty());
        assert_eq!(draft.relations.categories.len(), 1);
    }

    #[tokio::test]
    async fn failed_relation_lookup_is_counted_per_reference() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = FailingStore::new(memory.clone());
        store.fail_find = Some((EntityKind::Category, "Adventure"));
        let fetch = with_celeste(outer_wilds_fetch());
        let sync = CatalogSynchronizer::new(Arc::new(store), Arc::new(fetch), &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        // The upsert itself looks the name up first.
        assert_eq!(summary.relations_failed, 1);
        assert_eq!(summary.relations_created, 1);
        // Both games reference the category.
        assert_eq!(summary.relation_refs_unresolved, 2);
        assert_eq!(summary.games_created, 2);
        let (_, draft) = memory.game("Celeste").unwrap();
        assert!(draft.relations.categories.is_empty());
    }

    #[tokio::test]
    async fn failed_game_lookup_isolates_the_item() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = FailingStore::new(memory.clone());
        store.fail_find = Some((EntityKind::Game, "Outer Wilds"));
        let fetch = Arc::new(with_celeste(outer_wilds_fetch()));
        let sync = CatalogSynchronizer::new(Arc::new(store), fetch.clone(), &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_failed, 1);
        assert_eq!(summary.games_created, 1);
        assert_eq!(summary.relations_created, 2);
        assert!(memory.game("Outer Wilds").is_none());
        assert!(memory.game("Celeste").is_some());
        assert_eq!(fetch.hit_count("https://img.test/"), 0);
        assert_eq!(memory.file_count(), 0);
    }

    #[tokio::test]
    async fn failed_game_create_attaches_nothing() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = FailingStore::new(memory.clone());
        store.fail_create = Some((EntityKind::Game, "Outer Wilds"));
        let fetch = Arc::new(with_celeste(outer_wilds_fetch()));
        let sync = CatalogSynchronizer::new(Arc::new(store), fetch.clone(), &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.games_failed, 1);
        assert_eq!(summary.games_created, 1);
        assert_eq!(summary.metadata_fetched, 1);
        assert_eq!(summary.assets_attached, 0);
        assert_eq!(memory.count(EntityKind::Game), 1);
        assert_eq!(fetch.hit_count("https://img.test/"), 0);
        assert_eq!(memory.count_named(EntityKind::Developer, "Mobius Digital"), 1);
    }

    #[tokio::test]
    async fn malformed_item_does_not_abort_the_page() {
        let store = Arc::new(MemoryStore::new());
        let broken = json!({"id": 3, "title": "Broken", "slug": null, "price": "free"});
        let nulls = json!({"id": 4, "title": "Nulls", "slug": null, "developers": [null, "Maddy Makes Games"]});
        let fetch = Arc::new(
            outer_wilds_fetch().route(CATALOG, catalog(vec![outer_wilds(), broken, nulls])),
        );
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());

        let summary = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(summary.products, 3);
        assert_eq!(summary.games_created, 2);
        assert_eq!(summary.games_failed, 1);
        assert!(store.game("Outer Wilds").is_some());
        let (_, nulls) = store.game("Nulls").unwrap();
        assert_eq!(nulls.slug, "nulls");
        assert_eq!(nulls.relations.developers.len(), 1);
        assert!(store.game("Broken").is_none());
    }

    #[tokio::test]
    async fn titles_are_stored_and_matched_verbatim() {
        let mut padded = outer_wilds();
        padded["title"] = json!(" Outer Wilds ");
        let store = Arc::new(MemoryStore::new());
        let fetch = Arc::new(outer_wilds_fetch().route(CATALOG, catalog(vec![padded])));
        let sync = CatalogSynchronizer::new(store.clone(), fetch, &config());

        let first = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(first.games_created, 1);
        assert!(store.game(" Outer Wilds ").is_some());
        assert!(store.game("Outer Wilds").is_none());

        let second = sync.run(&CatalogQuery::default()).await.unwrap();
        assert_eq!(second.games_skipped, 1);
        assert_eq!(store.count(EntityKind::Game), 1);
    }

    #[tokio::test]
    async fn gallery_positions_follow_catalog_order() {
        let store = Arc::new(MemoryStore::new());
        let sync = CatalogSynchronizer::new(store.clone(), Arc::new(outer_wilds_fetch()), &config());
        sync.run(&CatalogQuery::default()).await.unwrap();

        let (game, _) = store.game("Outer Wilds").unwrap();
        let files = store.files_for(game.reference());
        let mut gallery: Vec<u32> = files
            .iter()
            .filter(|f| f.field == AssetField::Gallery)
            .map(|f| f.position)
            .collect();
        gallery.sort_unstable();
        assert_eq!(gallery, vec![0, 1]);
        let cover = files.iter().find(|f| f.field == AssetField::Cover).unwrap();
        assert_eq!(cover.position, 0);
    }
}
