#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postindex::application::filter::FilterRequest;
use postindex::application::observer::{CacheObserver, NoopObserver};
use postindex::application::repos::{SearchResults, Store, StoreError};
use postindex::application::source::{PostSource, PostStream, SourceError};
use postindex::application::taxonomy::TaxonomyCount;
use postindex::domain::{Post, PostId, PostStatus, Visibility};
use postindex::infra::memory::MemoryStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn published(post_type: &str, slug: &str) -> Post {
    let mut post = Post::new(post_type, slug);
    post.status = PostStatus::Published;
    post.visibility = Visibility::Public;
    post.title = format!("Title of {slug}");
    post
}

fn io_failure(what: &str) -> SourceError {
    SourceError::io(
        PathBuf::from(what),
        std::io::Error::other(format!("injected {what} failure")),
    )
}

/// Source kept in memory, with switches that make individual operations fail.
#[derive(Debug, Default)]
pub struct FakeSource {
    docs: Mutex<BTreeMap<PostId, Post>>,
    pub fail_write: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_move: AtomicBool,
    /// Moves that still succeed before every further move fails.
    pub moves_before_failure: Mutex<Option<usize>>,
    pub fail_walk_after: Mutex<Option<usize>>,
}

impl FakeSource {
    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let source = Self::default();
        {
            let mut docs = source.docs.lock().expect("docs lock");
            for post in posts {
                docs.insert(post.id(), post);
            }
        }
        source
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.docs.lock().expect("docs lock").contains_key(id)
    }

    pub fn document(&self, id: &PostId) -> Option<Post> {
        self.docs.lock().expect("docs lock").get(id).cloned()
    }

    pub fn insert(&self, post: Post) {
        self.docs.lock().expect("docs lock").insert(post.id(), post);
    }
}

#[async_trait]
impl PostSource for FakeSource {
    fn walk(&self, cancel: CancellationToken) -> PostStream {
        let docs: Vec<Post> = self.docs.lock().expect("docs lock").values().cloned().collect();
        let fail_after = *self.fail_walk_after.lock().expect("walk lock");
        let (post_tx, posts) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);
        tokio::spawn(async move {
            for (sent, post) in docs.into_iter().enumerate() {
                if fail_after == Some(sent) {
                    let _ = error_tx.send(io_failure("walk")).await;
                    return;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = post_tx.send(post) => if sent.is_err() { return },
                }
            }
        });
        PostStream { posts, errors }
    }

    async fn read(&self, id: &PostId) -> Result<Post, SourceError> {
        self.document(id).ok_or_else(|| SourceError::not_found(id))
    }

    async fn write(&self, post: &Post) -> Result<(), SourceError> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(io_failure("write"));
        }
        self.insert(post.clone());
        Ok(())
    }

    async fn delete(&self, id: &PostId) -> Result<(), SourceError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(io_failure("delete"));
        }
        self.docs
            .lock()
            .expect("docs lock")
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SourceError::not_found(id))
    }

    async fn move_post(&self, from: &PostId, to: &PostId) -> Result<(), SourceError> {
        if self.fail_move.load(Ordering::SeqCst) {
            return Err(io_failure("move"));
        }
        if let Some(left) = self.moves_before_failure.lock().expect("move lock").as_mut() {
            if *left == 0 {
                return Err(io_failure("move"));
            }
            *left -= 1;
        }
        let mut docs = self.docs.lock().expect("docs lock");
        if docs.contains_key(to) {
            return Err(SourceError::already_exists(to));
        }
        let mut post = docs.remove(from).ok_or_else(|| SourceError::not_found(from))?;
        post.set_id(to);
        docs.insert(to.clone(), post);
        Ok(())
    }
}

/// A memory store whose writes can be made to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_get: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    pub fn with_observer(observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            inner: MemoryStore::new(observer),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool, op: &'static str, id: &PostId) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::backend(op, Some(id), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.inner.init().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }

    async fn create(&self, post: Post) -> Result<Post, StoreError> {
        Self::check(&self.fail_create, "create", &post.id())?;
        self.inner.create(post).await
    }

    async fn update(&self, old_id: &PostId, post: Post) -> Result<(), StoreError> {
        Self::check(&self.fail_update, "update", old_id)?;
        self.inner.update(old_id, post).await
    }

    async fn delete(&self, id: &PostId) -> Result<(), StoreError> {
        Self::check(&self.fail_delete, "delete", id)?;
        self.inner.delete(id).await
    }

    async fn get(&self, id: &PostId) -> Result<Post, StoreError> {
        Self::check(&self.fail_get, "get", id)?;
        self.inner.get(id).await
    }

    async fn search(&self, request: &FilterRequest) -> Result<SearchResults, StoreError> {
        self.inner.search(request).await
    }

    async fn list_taxonomies(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_taxonomies().await
    }

    async fn list_term_counts(&self, taxonomy: &str) -> Result<Vec<TaxonomyCount>, StoreError> {
        self.inner.list_term_counts(taxonomy).await
    }
}
