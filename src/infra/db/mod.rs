//! SQLite-backed store with an FTS5 index living in the same database.
//!
//! Records, taxonomy rows, counts and the full-text row for a post all change inside one
//! transaction, so the search index never lags the records here.

mod query;
mod util;
mod write;

pub use util::map_sqlx_error;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    QueryBuilder, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use tracing::debug;

use crate::application::filter::{FilterRequest, QueryPlan};
use crate::application::observer::CacheObserver;
use crate::application::repos::{SearchResults, Store, StoreError};
use crate::application::taxonomy::TaxonomyCount;
use crate::domain::{Post, PostId};
use crate::infra::error::InfraError;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
    observer: Arc<dyn CacheObserver>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            pool: Arc::new(pool),
            observer,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a pool for `url`. In-memory databases are pinned to one long-lived
    /// connection, since every connection to `:memory:` is a separate database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, InfraError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|err| InfraError::store_open("sqlite", err))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        pool_options
            .connect_with(options)
            .await
            .map_err(|err| InfraError::store_open("sqlite", err))
    }

    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    fn report_drift(&self, drift: Vec<(String, String)>) {
        for (taxonomy, term) in drift {
            self.observer.taxonomy_drift(&taxonomy, &term);
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<(), StoreError> {
        Self::run_migrations(self.pool())
            .await
            .map_err(map_sqlx_error("init", None))?;
        debug!(target: "postindex::store", "sqlite migrations applied");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_sqlx_error("clear", None))?;
        for table in [
            "post_terms",
            "post_properties",
            "posts_fts",
            "taxonomy_counts",
            "posts",
        ] {
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table}"))
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error("clear", None))?;
        }
        tx.commit().await.map_err(map_sqlx_error("clear", None))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }

    async fn create(&self, post: Post) -> Result<Post, StoreError> {
        let drift = write::create(&self.pool, &post).await?;
        self.report_drift(drift);
        Ok(post)
    }

    async fn update(&self, old_id: &PostId, post: Post) -> Result<(), StoreError> {
        let drift = write::update(&self.pool, old_id, &post).await?;
        self.report_drift(drift);
        Ok(())
    }

    async fn delete(&self, id: &PostId) -> Result<(), StoreError> {
        let drift = write::delete(&self.pool, id).await?;
        self.report_drift(drift);
        Ok(())
    }

    async fn get(&self, id: &PostId) -> Result<Post, StoreError> {
        let document: String =
            sqlx::query_scalar("SELECT document FROM posts WHERE post_id = ?")
                .bind(id.to_string())
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error("get", Some(id)))?;
        query::decode(&document, "get")
    }

    async fn search(&self, request: &FilterRequest) -> Result<SearchResults, StoreError> {
        query::search(self.pool(), &QueryPlan::new(request)).await
    }

    async fn list_taxonomies(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT DISTINCT taxonomy FROM taxonomy_counts ORDER BY taxonomy")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error("list_taxonomies", None))
    }

    async fn list_term_counts(&self, taxonomy: &str) -> Result<Vec<TaxonomyCount>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT term, count FROM taxonomy_counts WHERE taxonomy = ? ORDER BY term",
        )
        .bind(taxonomy)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error("list_term_counts", None))?;

        rows.into_iter()
            .map(|(term, count)| {
                let count = u64::try_from(count).map_err(|_| {
                    StoreError::backend("list_term_counts", None, "negative taxonomy count")
                })?;
                Ok(TaxonomyCount {
                    taxonomy: taxonomy.to_string(),
                    term,
                    count,
                })
            })
            .collect()
    }
}
