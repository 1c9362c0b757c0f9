//! Listing persistence and the version-checked update.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use super::{
    filters::{Filters, Metadata},
    price::Price,
    types::Ad,
};
use crate::api::storage::{StorageError, bounded};

#[async_trait]
pub trait AdStore: Send + Sync {
    /// Insert `ad`, filling in its `id`, `created_at` and initial `version`.
    async fn insert(&self, ad: &mut Ad) -> Result<(), StorageError>;

    /// `NotFound` for ids below 1 or absent records.
    async fn get(&self, id: i64) -> Result<Ad, StorageError>;

    /// Title full-text match and category containment; an empty title or
    /// category list matches everything.
    async fn list(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Ad>, Metadata), StorageError>;

    /// Compare-and-swap on `(ad.id, ad.version)`. Returns the new version, or
    /// `EditConflict` when no row matched, whether the version moved on or the
    /// record is gone.
    async fn update(&self, ad: &Ad) -> Result<i32, StorageError>;

    /// `NotFound` for ids below 1 (without touching storage) or absent records.
    async fn delete(&self, id: i64) -> Result<(), StorageError>;
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn ad_from_row(row: &PgRow) -> Ad {
    Ad {
        id: row.get("id"),
        created_at: row.get("created_at"),
        title: row.get("title"),
        description: row.get("description"),
        categories: row.get("categories"),
        price: Price(row.get("price")),
        version: row.get("version"),
    }
}

#[derive(Clone, Debug)]
pub struct PgAdStore {
    pool: PgPool,
}

impl PgAdStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdStore for PgAdStore {
    async fn insert(&self, ad: &mut Ad) -> Result<(), StorageError> {
        let query = r"
            INSERT INTO ads (title, description, price, categories)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        ";
        let row = bounded(
            "insert ad",
            sqlx::query(query)
                .bind(&ad.title)
                .bind(&ad.description)
                .bind(ad.price.0)
                .bind(&ad.categories)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query)),
        )
        .await?;

        ad.id = row.get("id");
        ad.created_at = row.get("created_at");
        ad.version = row.get("version");
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Ad, StorageError> {
        if id < 1 {
            return Err(StorageError::NotFound);
        }
        let query = r"
            SELECT id, created_at, title, description, price, categories, version
            FROM ads
            WHERE id = $1
        ";
        let row = bounded(
            "get ad",
            sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query)),
        )
        .await?;
        row.as_ref().map(ad_from_row).ok_or(StorageError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Ad>, Metadata), StorageError> {
        // Column and direction come from the safelisted `Sort`, never from input.
        let query = format!(
            r"
            SELECT count(*) OVER() AS total, id, created_at, title, description, price, categories, version
            FROM ads
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
              AND (categories @> $2 OR $2 = '{{}}')
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            ",
            filters.sort.column_sql(),
            filters.sort.direction_sql()
        );
        let rows = bounded(
            "list ads",
            sqlx::query(&query)
                .bind(title)
                .bind(categories)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool)
                .instrument(db_span("SELECT", &query)),
        )
        .await?;

        let total = rows.first().map_or(0, |row| row.get::<i64, _>("total"));
        let ads = rows.iter().map(ad_from_row).collect();
        Ok((
            ads,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }

    async fn update(&self, ad: &Ad) -> Result<i32, StorageError> {
        let query = r"
            UPDATE ads
            SET title = $1, description = $2, price = $3, categories = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        ";
        let row = bounded(
            "update ad",
            sqlx::query(query)
                .bind(&ad.title)
                .bind(&ad.description)
                .bind(ad.price.0)
                .bind(&ad.categories)
                .bind(ad.id)
                .bind(ad.version)
                .fetch_optional(&self.pool)
                .instrument(db_span("UPDATE", query)),
        )
        .await?;
        row.map(|row| row.get("version"))
            .ok_or(StorageError::EditConflict)
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        if id < 1 {
            return Err(StorageError::NotFound);
        }
        let query = "DELETE FROM ads WHERE id = $1";
        let result = bounded(
            "delete ad",
            sqlx::query(query)
                .bind(id)
                .execute(&self.pool)
                .instrument(db_span("DELETE", query)),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
