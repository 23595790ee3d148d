//! Process-local store.
//!
//! One reader/writer lock guards both the post map and the taxonomy counts, so counts
//! and membership always change together.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::application::filter::{FilterRequest, QueryPlan};
use crate::application::observer::CacheObserver;
use crate::application::repos::{SearchResults, Store, StoreError};
use crate::application::taxonomy::{TaxonomyCount, TaxonomyCounter, TaxonomyDiff};
use crate::domain::{Post, PostId};

use super::lock::{read_guard, write_guard};

#[derive(Debug, Default)]
struct MemoryState {
    posts: BTreeMap<PostId, Post>,
    taxonomies: TaxonomyCounter,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    observer: Arc<dyn CacheObserver>,
}

impl MemoryStore {
    pub fn new(observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            observer,
        }
    }

    fn apply(&self, state: &mut MemoryState, diff: &TaxonomyDiff) {
        for (taxonomy, term) in diff.apply(&mut state.taxonomies) {
            self.observer.taxonomy_drift(&taxonomy, &term);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = write_guard(&self.state, "clear");
        state.posts.clear();
        state.taxonomies.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, post: Post) -> Result<Post, StoreError> {
        let id = post.id();
        let mut state = write_guard(&self.state, "create");
        if state.posts.contains_key(&id) {
            return Err(StoreError::already_exists(&id));
        }
        self.apply(&mut state, &TaxonomyDiff::added(&post));
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn update(&self, old_id: &PostId, post: Post) -> Result<(), StoreError> {
        let new_id = post.id();
        let mut state = write_guard(&self.state, "update");
        if !state.posts.contains_key(old_id) {
            return Err(StoreError::not_found(old_id));
        }
        if new_id != *old_id && state.posts.contains_key(&new_id) {
            return Err(StoreError::already_exists(&new_id));
        }
        let Some(previous) = state.posts.remove(old_id) else {
            return Err(StoreError::not_found(old_id));
        };
        self.apply(&mut state, &TaxonomyDiff::between(&previous, &post));
        state.posts.insert(new_id, post);
        Ok(())
    }

    async fn delete(&self, id: &PostId) -> Result<(), StoreError> {
        let mut state = write_guard(&self.state, "delete");
        let Some(previous) = state.posts.remove(id) else {
            return Err(StoreError::not_found(id));
        };
        self.apply(&mut state, &TaxonomyDiff::removed(&previous));
        Ok(())
    }

    async fn get(&self, id: &PostId) -> Result<Post, StoreError> {
        read_guard(&self.state, "get")
            .posts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn search(&self, request: &FilterRequest) -> Result<SearchResults, StoreError> {
        let plan = QueryPlan::new(request);
        let state = read_guard(&self.state, "search");
        Ok(plan.execute(state.posts.values()))
    }

    async fn list_taxonomies(&self) -> Result<Vec<String>, StoreError> {
        Ok(read_guard(&self.state, "list_taxonomies").taxonomies.taxonomies())
    }

    async fn list_term_counts(&self, taxonomy: &str) -> Result<Vec<TaxonomyCount>, StoreError> {
        Ok(read_guard(&self.state, "list_term_counts")
            .taxonomies
            .term_counts(taxonomy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::observer::NoopObserver;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn update_moves_record_to_new_id() {
        let store = store();
        let post = Post::new("articles", "draft-name").with_terms("tags", ["x"]);
        store.create(post.clone()).await.expect("create");

        let mut renamed = post.clone();
        renamed.slug = "final-name".into();
        store
            .update(&post.id(), renamed.clone())
            .await
            .expect("update");

        assert!(store.get(&post.id()).await.unwrap_err().is_not_found());
        assert_eq!(store.get(&renamed.id()).await.expect("moved"), renamed);
        assert_eq!(store.list_terms("tags").await.expect("terms"), vec!["x"]);
    }

    #[tokio::test]
    async fn update_onto_existing_id_is_rejected() {
        let store = store();
        let a = Post::new("articles", "a");
        let b = Post::new("articles", "b");
        store.create(a.clone()).await.expect("create a");
        store.create(b.clone()).await.expect("create b");

        let err = store.update(&a.id(), b.clone()).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.get(&a.id()).await.expect("a untouched"), a);
    }

    #[tokio::test]
    async fn clear_drops_posts_and_counts() {
        let store = store();
        store
            .create(Post::new("notes", "n").with_terms("tags", ["t"]))
            .await
            .expect("create");
        store.clear().await.expect("clear");
        assert!(store.list_taxonomies().await.expect("taxonomies").is_empty());
        assert_eq!(
            store
                .search(&FilterRequest::default())
                .await
                .expect("search")
                .total,
            0
        );
    }
}
