use anyhow::Context;
use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use super::store::{
    BinaryAttachment, EntityKind, GameDraft, NewRecord, RecordRef, Store, StoreError, StoredFile,
    StoredRecord,
};
use crate::util::db::Db;
use crate::util::env;

/// Postgres-backed [`Store`]; schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Connect using `db_url` or, when absent, the `DATABASE_URL`/`DB_*` environment.
    pub async fn connect(db_url: Option<String>) -> anyhow::Result<Self> {
        let url = match db_url {
            Some(url) => url,
            None => env::db_url()?,
        };
        let max_connections: u32 = env::env_parse("DB_MAX_CONNS", 10u32);
        let db = Db::connect(&url, max_connections)
            .await
            .context("database connection failed")?;
        Ok(Self::new(db))
    }

    async fn insert_game(&self, draft: &GameDraft) -> Result<StoredRecord, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO games (name, slug, price, currency, release_date, description, short_description, age_rating)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .persistent(false)
        .bind(&draft.name)
        .bind(&draft.slug)
        .bind(draft.price)
        .bind(&draft.currency)
        .bind(draft.release_date)
        .bind(&draft.description)
        .bind(&draft.short_description)
        .bind(draft.age_rating.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let game_id: i64 = row.get("id");

        for rel in draft.relations.iter() {
            let Some((table, column)) = join_table(rel.kind) else {
                continue;
            };
            let sql = format!(
                "INSERT INTO {table} (game_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            );
            sqlx::query(&sql)
                .persistent(false)
                .bind(game_id)
                .bind(rel.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(StoredRecord {
            id: game_id,
            kind: EntityKind::Game,
            name: draft.name.clone(),
            slug: draft.slug.clone(),
        })
    }
}

fn join_table(kind: EntityKind) -> Option<(&'static str, &'static str)> {
    match kind {
        EntityKind::Developer => Some(("games_developers", "developer_id")),
        EntityKind::Publisher => Some(("games_publishers", "publisher_id")),
        EntityKind::Category => Some(("games_categories", "category_id")),
        EntityKind::Platform => Some(("games_platforms", "platform_id")),
        EntityKind::Game => None,
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let sql = format!(
            "SELECT id, name, slug FROM {} WHERE name = $1 ORDER BY id",
            kind.collection()
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(name)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredRecord {
                id: r.get("id"),
                kind,
                name: r.get("name"),
                slug: r.get("slug"),
            })
            .collect())
    }

    #[instrument(skip(self, data), fields(name = %data.name()))]
    async fn create(&self, kind: EntityKind, data: NewRecord) -> Result<StoredRecord, StoreError> {
        match (kind, data) {
            (EntityKind::Game, NewRecord::Game(draft)) => self.insert_game(&draft).await,
            (kind, NewRecord::Named { name, slug }) if kind.is_relation() => {
                let sql = format!(
                    "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING id",
                    kind.collection()
                );
                let row = sqlx::query(&sql)
                    .persistent(false)
                    .bind(&name)
                    .bind(&slug)
                    .fetch_one(&self.db.pool)
                    .await?;
                let id: i64 = row.get("id");
                debug!(%kind, id, "created record");
                Ok(StoredRecord {
                    id,
                    kind,
                    name,
                    slug,
                })
            }
            (kind, NewRecord::Named { .. }) => Err(StoreError::ShapeMismatch {
                kind,
                shape: "named",
            }),
            (kind, NewRecord::Game(_)) => Err(StoreError::ShapeMismatch {
                kind,
                shape: "game",
            }),
        }
    }

    #[instrument(skip(self, attachment), fields(target = %attachment.target, field = %attachment.field))]
    async fn attach_file(&self, attachment: BinaryAttachment) -> Result<StoredFile, StoreError> {
        let RecordRef { kind, id } = attachment.target;
        let mut tx = self.db.pool.begin().await?;

        let exists_sql = format!("SELECT 1 FROM {} WHERE id = $1", kind.collection());
        if sqlx::query(&exists_sql)
            .persistent(false)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_none()
        {
            return Err(StoreError::MissingTarget(attachment.target));
        }

        let size = i64::try_from(attachment.size).unwrap_or(i64::MAX);
        let row = sqlx::query(
            "INSERT INTO files (name, stored_name, ext, mime, size, content)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .persistent(false)
        .bind(&attachment.filename)
        .bind(&attachment.stored_name)
        .bind(&attachment.ext)
        .bind(&attachment.mime)
        .bind(size)
        .bind(attachment.content.as_ref())
        .fetch_one(&mut *tx)
        .await?;
        let file_id: i64 = row.get("id");

        // Position comes from the caller; the unique slot index rejects duplicates.
        let position = i32::try_from(attachment.position).unwrap_or(i32::MAX);
        sqlx::query(
            "INSERT INTO files_related (file_id, related_type, related_id, field, position)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .persistent(false)
        .bind(file_id)
        .bind(kind.collection())
        .bind(id)
        .bind(attachment.field.as_str())
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(|err| match err.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::SlotTaken {
                target: attachment.target,
                field: attachment.field,
                position: attachment.position,
            },
            _ => StoreError::Database(err),
        })?;
        tx.commit().await?;

        Ok(StoredFile {
            id: file_id,
            stored_name: attachment.stored_name,
            target: attachment.target,
            field: attachment.field,
            position: attachment.position,
        })
    }
}
