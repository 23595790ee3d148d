//! Embedded store built from two redb files.
//!
//! `records.redb` holds the canonical posts and taxonomy counts, updated in a single
//! write transaction per call. `search.redb` holds the token index and is updated
//! second; when that step fails the call still succeeds and the observer is told the
//! index is stale.

mod records;
mod search;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use redb::Database;
use thiserror::Error;
use tracing::debug;

use crate::application::filter::{FilterRequest, QueryPlan};
use crate::application::observer::CacheObserver;
use crate::application::repos::{SearchResults, Store, StoreError};
use crate::application::taxonomy::TaxonomyCount;
use crate::domain::{Post, PostId};

use super::lock::{read_guard, write_guard};

const RECORDS_FILE: &str = "records.redb";
const SEARCH_FILE: &str = "search.redb";

#[derive(Debug, Error)]
pub(crate) enum KvError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Redb(#[from] redb::Error),
    #[error("record encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KvError {
                fn from(err: $ty) -> Self {
                    KvError::Redb(err.into())
                }
            }
        )*
    };
}

redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl KvError {
    fn into_store(self, op: &'static str, id: Option<&PostId>) -> StoreError {
        match self {
            KvError::Store(err) => err,
            other => StoreError::backend(op, id, other),
        }
    }
}

struct Engines {
    records: Database,
    search: Database,
}

pub struct RedbStore {
    dir: PathBuf,
    engines: RwLock<Option<Arc<Engines>>>,
    observer: Arc<dyn CacheObserver>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Files are created under `dir` on [`Store::init`].
    pub fn new(dir: impl Into<PathBuf>, observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            dir: dir.into(),
            engines: RwLock::new(None),
            observer,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn engines(&self, op: &'static str, id: Option<&PostId>) -> Result<Arc<Engines>, StoreError> {
        read_guard(&self.engines, op)
            .clone()
            .ok_or_else(|| StoreError::backend(op, id, "store is not initialised"))
    }

    async fn blocking<T, F>(&self, op: &'static str, id: Option<&PostId>, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Engines) -> Result<T, KvError> + Send + 'static,
    {
        let engines = self.engines(op, id)?;
        tokio::task::spawn_blocking(move || work(&engines))
            .await
            .map_err(|err| StoreError::backend(op, id, err))?
            .map_err(|err| err.into_store(op, id))
    }

    fn report_drift(&self, drift: Vec<(String, String)>) {
        for (taxonomy, term) in drift {
            self.observer.taxonomy_drift(&taxonomy, &term);
        }
    }

    /// Second phase of every mutation. Failures are reported, never returned.
    async fn refresh_index<F>(&self, op: &'static str, id: &PostId, work: F)
    where
        F: FnOnce(&Database) -> Result<(), KvError> + Send + 'static,
    {
        if let Err(err) = self.blocking(op, Some(id), move |engines| work(&engines.search)).await {
            self.observer.search_index_stale(id, op, &err.to_string());
        }
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn init(&self) -> Result<(), StoreError> {
        if read_guard(&self.engines, "init").is_some() {
            return Ok(());
        }
        let dir = self.dir.clone();
        let engines = tokio::task::spawn_blocking(move || -> Result<Engines, KvError> {
            std::fs::create_dir_all(&dir)?;
            let records = Database::create(dir.join(RECORDS_FILE))?;
            records::ensure_tables(&records)?;
            let search = Database::create(dir.join(SEARCH_FILE))?;
            search::ensure_tables(&search)?;
            Ok(Engines { records, search })
        })
        .await
        .map_err(|err| StoreError::backend("init", None, err))?
        .map_err(|err| err.into_store("init", None))?;

        debug!(target: "postindex::store", dir = %self.dir.display(), "embedded store opened");
        *write_guard(&self.engines, "init") = Some(Arc::new(engines));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.blocking("clear", None, |engines| {
            records::clear(&engines.records)?;
            search::clear(&engines.search)
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        write_guard(&self.engines, "close").take();
        Ok(())
    }

    async fn create(&self, post: Post) -> Result<Post, StoreError> {
        let id = post.id();
        let record = post.clone();
        let drift = self
            .blocking("create", Some(&id), move |engines| {
                records::create(&engines.records, &record)
            })
            .await?;
        self.report_drift(drift);

        let indexed = post.clone();
        let key = id.to_string();
        self.refresh_index("create", &id, move |db| search::reindex(db, &key, &indexed))
            .await;
        Ok(post)
    }

    async fn update(&self, old_id: &PostId, post: Post) -> Result<(), StoreError> {
        let old = old_id.clone();
        let record = post.clone();
        let drift = self
            .blocking("update", Some(old_id), move |engines| {
                records::update(&engines.records, &old, &record)
            })
            .await?;
        self.report_drift(drift);

        let key = old_id.to_string();
        self.refresh_index("update", &post.id(), move |db| search::reindex(db, &key, &post))
            .await;
        Ok(())
    }

    async fn delete(&self, id: &PostId) -> Result<(), StoreError> {
        let target = id.clone();
        let drift = self
            .blocking("delete", Some(id), move |engines| {
                records::delete(&engines.records, &target)
            })
            .await?;
        self.report_drift(drift);

        let key = id.to_string();
        self.refresh_index("delete", id, move |db| search::remove(db, &key))
            .await;
        Ok(())
    }

    async fn get(&self, id: &PostId) -> Result<Post, StoreError> {
        let target = id.clone();
        self.blocking("get", Some(id), move |engines| {
            records::get(&engines.records, &target)
        })
        .await
    }

    async fn search(&self, request: &FilterRequest) -> Result<SearchResults, StoreError> {
        let plan = QueryPlan::new(request);
        self.blocking("search", None, move |engines| {
            let candidates = if plan.search_tokens.is_empty() {
                records::all(&engines.records)?
            } else {
                let ids = search::candidates(&engines.search, &plan.search_tokens)?;
                records::many(&engines.records, &ids)?
            };
            // Candidates are re-checked against the canonical records.
            Ok(plan.execute(candidates))
        })
        .await
    }

    async fn list_taxonomies(&self) -> Result<Vec<String>, StoreError> {
        self.blocking("list_taxonomies", None, |engines| {
            records::taxonomies(&engines.records)
        })
        .await
    }

    async fn list_term_counts(&self, taxonomy: &str) -> Result<Vec<TaxonomyCount>, StoreError> {
        let taxonomy = taxonomy.to_string();
        self.blocking("list_term_counts", None, move |engines| {
            records::term_counts(&engines.records, &taxonomy)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::observer::NoopObserver;

    #[tokio::test]
    async fn operations_before_init_fail_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::new(dir.path(), Arc::new(NoopObserver));
        let err = store.get(&PostId::new("articles", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { op: "get", .. }));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let post = Post::new("articles", "kept").with_terms("tags", ["x"]);
        {
            let store = RedbStore::new(dir.path(), Arc::new(NoopObserver));
            store.init().await.expect("init");
            store.create(post.clone()).await.expect("create");
            store.close().await.expect("close");
        }
        let store = RedbStore::new(dir.path(), Arc::new(NoopObserver));
        store.init().await.expect("reopen");
        assert_eq!(store.get(&post.id()).await.expect("get"), post);
        assert_eq!(store.list_terms("tags").await.expect("terms"), vec!["x"]);
    }

    #[tokio::test]
    async fn renamed_post_is_found_by_new_text_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::new(dir.path(), Arc::new(NoopObserver));
        store.init().await.expect("init");

        let mut post = Post::new("articles", "a");
        post.status = crate::domain::PostStatus::Published;
        post.visibility = crate::domain::Visibility::Public;
        post.title = "Lighthouse keeping".into();
        store.create(post.clone()).await.expect("create");

        let mut moved = post.clone();
        moved.slug = "b".into();
        moved.title = "Harbour pilots".into();
        store.update(&post.id(), moved.clone()).await.expect("update");

        let search = |text: &str| FilterRequest {
            search: text.into(),
            ..Default::default()
        };
        assert_eq!(store.search(&search("lighth")).await.expect("old").total, 0);
        let hits = store.search(&search("harb")).await.expect("new");
        assert_eq!(hits.total, 1);
        assert_eq!(hits.posts[0].id(), moved.id());
    }
}
