//! Keeps a [`Store`] consistent with the [`PostSource`] that owns the documents.
//!
//! Writes go to the source first and the store second. When the store step fails the
//! source step is undone where the protocol allows it; when the undo fails as well the
//! caller gets [`SyncError::InconsistentState`] and a resync is required.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::application::filter::{FilterRequest, QueryPlan};
use crate::application::observer::CacheObserver;
use crate::application::pagination::{DEFAULT_PAGE_SIZE, Page};
use crate::application::repos::{Store, StoreError};
use crate::application::source::{PostSource, PostStream, SourceError};
use crate::domain::{DomainError, Post, PostId, PostTypes};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("post `{id}` not found")]
    NotFound { id: PostId },
    #[error("store {step} failed: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("source {step} failed: {source}")]
    Source {
        step: &'static str,
        #[source]
        source: SourceError,
    },
    #[error("source and store diverged for `{id}`: {original}; compensation failed: {compensation}")]
    InconsistentState {
        id: PostId,
        original: Box<SyncError>,
        compensation: Box<SyncError>,
    },
}

impl SyncError {
    fn in_store(step: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { step, source }
    }

    fn in_source(step: &'static str) -> impl FnOnce(SourceError) -> Self {
        move |source| Self::Source { step, source }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::NotFound { .. } => true,
            SyncError::Store { source, .. } => source.is_not_found(),
            SyncError::Source { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_inconsistent(&self) -> bool {
        matches!(self, SyncError::InconsistentState { .. })
    }
}

#[derive(Debug)]
pub struct SyncFailure {
    pub id: PostId,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<SyncFailure>,
    /// The walk stopped early because the caller cancelled it.
    pub cancelled: bool,
}

enum Indexed {
    Created,
    Updated,
}

pub struct SyncCoordinator {
    source: Arc<dyn PostSource>,
    store: Arc<dyn Store>,
    post_types: PostTypes,
    observer: Arc<dyn CacheObserver>,
    default_page_size: u32,
}

impl SyncCoordinator {
    pub fn new(
        source: Arc<dyn PostSource>,
        store: Arc<dyn Store>,
        post_types: PostTypes,
        observer: Arc<dyn CacheObserver>,
    ) -> Self {
        Self {
            source,
            store,
            post_types,
            observer,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size used by [`SyncCoordinator::search`] when a request leaves it at zero.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn post_types(&self) -> &PostTypes {
        &self.post_types
    }

    /// Write the document, then index it. A failed index step removes the document again.
    #[instrument(skip_all, fields(post_id = %post.id()))]
    pub async fn create(&self, post: Post) -> Result<Post, SyncError> {
        let id = post.id();
        self.post_types.validate(&id)?;

        // Create never overwrites the document of an indexed post.
        self.ensure_unindexed("create", &id).await?;

        self.source
            .write(&post)
            .await
            .map_err(SyncError::in_source("write"))?;

        match self.store.create(post).await {
            Ok(created) => Ok(created),
            Err(err) => {
                let original = SyncError::in_store("create")(err);
                match self.source.delete(&id).await {
                    Ok(()) => Err(original),
                    Err(undo) => Err(self.diverged(id, original, SyncError::in_source("delete")(undo))),
                }
            }
        }
    }

    /// Move the document if its identity changed, rewrite it, then update the index.
    /// A new identity that is already indexed is rejected before anything moves. A failed
    /// index step moves the document back to `old_id`.
    #[instrument(skip_all, fields(old_id = %old_id, post_id = %post.id()))]
    pub async fn update(&self, old_id: &PostId, post: Post) -> Result<(), SyncError> {
        let new_id = post.id();
        self.post_types.validate(&new_id)?;
        let moved = *old_id != new_id;

        if moved {
            self.ensure_unindexed("update", &new_id).await?;
            self.source
                .move_post(old_id, &new_id)
                .await
                .map_err(SyncError::in_source("move"))?;
        }

        if let Err(err) = self.source.write(&post).await {
            return Err(self
                .undo_move(moved, old_id, &new_id, SyncError::in_source("write")(err))
                .await);
        }

        if let Err(err) = self.store.update(old_id, post).await {
            return Err(self
                .undo_move(moved, old_id, &new_id, SyncError::in_store("update")(err))
                .await);
        }

        Ok(())
    }

    /// `AlreadyExists` when `id` is indexed; other store errors are passed on.
    async fn ensure_unindexed(&self, step: &'static str, id: &PostId) -> Result<(), SyncError> {
        match self.store.get(id).await {
            Ok(_) => Err(SyncError::Store {
                step,
                source: StoreError::already_exists(id),
            }),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(SyncError::in_store(step)(err)),
        }
    }

    async fn undo_move(
        &self,
        moved: bool,
        old_id: &PostId,
        new_id: &PostId,
        original: SyncError,
    ) -> SyncError {
        if !moved {
            return original;
        }
        match self.source.move_post(new_id, old_id).await {
            Ok(()) => original,
            Err(undo) => self.diverged(new_id.clone(), original, SyncError::in_source("move back")(undo)),
        }
    }

    /// Delete the document, then the index entry. The source is authoritative, so a failed
    /// store step is reported but not rolled back.
    #[instrument(skip_all, fields(post_id = %id))]
    pub async fn delete(&self, id: &PostId) -> Result<(), SyncError> {
        match self.source.delete(id).await {
            Ok(()) => {}
            // Already gone from the source; still drop the stale index entry.
            Err(err) if err.is_not_found() => {
                debug!(post_id = %id, "document already absent from source");
            }
            Err(err) => return Err(SyncError::in_source("delete")(err)),
        }

        self.store
            .delete(id)
            .await
            .map_err(SyncError::in_store("delete"))
    }

    /// Serve from the store, falling back to the source and refilling the store.
    #[instrument(skip_all, fields(post_id = %id))]
    pub async fn get(&self, id: &PostId) -> Result<Post, SyncError> {
        match self.store.get(id).await {
            Ok(post) => return Ok(post),
            Err(err) if err.is_not_found() => {}
            Err(err) => debug!(error = %err, "store read failed; falling back to source"),
        }

        let post = self.source.read(id).await.map_err(|err| {
            if err.is_not_found() {
                SyncError::NotFound { id: id.clone() }
            } else {
                SyncError::in_source("read")(err)
            }
        })?;

        match self.store.create(post.clone()).await {
            Ok(_) => self.observer.cache_refilled(id),
            Err(err) => self.observer.refill_failed(id, &err),
        }

        Ok(post)
    }

    /// Run a filtered query against the store and wrap it in page metadata.
    pub async fn search(&self, request: &FilterRequest) -> Result<Page<Post>, SyncError> {
        let mut request = request.clone();
        if request.page_size == 0 {
            request.page_size = self.default_page_size;
        }
        let plan = QueryPlan::new(&request);
        let results = self
            .store
            .search(&request)
            .await
            .map_err(SyncError::in_store("search"))?;
        Ok(Page::from_results(results, plan.window, plan.split_pinned))
    }

    /// Walk the source and index every post, creating or updating as needed.
    ///
    /// A walk error aborts the resync. Failures on individual posts are collected in the
    /// report and the walk continues.
    #[instrument(skip_all)]
    pub async fn sync_all(&self, cancel: CancellationToken) -> Result<SyncReport, SyncError> {
        let walk = cancel.child_token();
        let PostStream {
            mut posts,
            mut errors,
        } = self.source.walk(walk.clone());
        let mut report = SyncReport::default();
        let mut posts_open = true;
        let mut errors_open = true;

        while (posts_open || errors_open) && !cancel.is_cancelled() {
            tokio::select! {
                biased;
                error = errors.recv(), if errors_open => match error {
                    Some(error) => {
                        walk.cancel();
                        return Err(SyncError::in_source("walk")(error));
                    }
                    None => errors_open = false,
                },
                post = posts.recv(), if posts_open => match post {
                    Some(post) => self.index(post, &mut report).await,
                    None => posts_open = false,
                },
            }
        }

        report.cancelled = cancel.is_cancelled();
        self.observer.sync_finished(&report);
        Ok(report)
    }

    async fn index(&self, post: Post, report: &mut SyncReport) {
        let id = post.id();
        match self.index_one(&id, post).await {
            Ok(Indexed::Created) => report.created += 1,
            Ok(Indexed::Updated) => report.updated += 1,
            Err(error) => {
                self.observer.sync_item_failed(&id, &error);
                report.failures.push(SyncFailure { id, error });
            }
        }
    }

    async fn index_one(&self, id: &PostId, post: Post) -> Result<Indexed, SyncError> {
        self.post_types.validate(id)?;
        match self.store.create(post.clone()).await {
            Ok(_) => Ok(Indexed::Created),
            Err(err) if err.is_already_exists() => self
                .store
                .update(id, post)
                .await
                .map(|()| Indexed::Updated)
                .map_err(SyncError::in_store("update")),
            Err(err) => Err(SyncError::in_store("create")(err)),
        }
    }

    fn diverged(&self, id: PostId, original: SyncError, compensation: SyncError) -> SyncError {
        let error = SyncError::InconsistentState {
            id: id.clone(),
            original: Box::new(original),
            compensation: Box::new(compensation),
        };
        self.observer.compensation_failed(&id, &error);
        error
    }
}
