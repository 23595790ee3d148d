//! The store contract every backend implements.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::application::filter::FilterRequest;
use crate::application::taxonomy::TaxonomyCount;
use crate::domain::{Post, PostId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("post `{id}` not found")]
    NotFound { id: PostId },
    #[error("post `{id}` already exists")]
    AlreadyExists { id: PostId },
    #[error("{op} failed{}: {message}", id_suffix(.id))]
    Backend {
        op: &'static str,
        id: Option<PostId>,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(id: &PostId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    pub fn already_exists(id: &PostId) -> Self {
        Self::AlreadyExists { id: id.clone() }
    }

    pub fn backend(op: &'static str, id: Option<&PostId>, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            id: id.cloned(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

fn id_suffix(id: &Option<PostId>) -> String {
    id.as_ref()
        .map(|id| format!(" for `{id}`"))
        .unwrap_or_default()
}

/// Output of [`Store::search`].
///
/// `total` counts the whole filtered set. `posts` holds the requested window, preceded
/// by every matching pinned post when the request split them out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub posts: Vec<Post>,
    pub total: usize,
}

/// A derived, queryable index of posts.
///
/// Each mutating call is atomic within the backend's record store and keeps taxonomy
/// counts equal to the number of live posts carrying each term.
#[async_trait]
pub trait Store: Send + Sync {
    /// Prepare storage. Safe to call more than once.
    async fn init(&self) -> Result<(), StoreError>;

    /// Drop every post and count.
    async fn clear(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] when the id is taken.
    async fn create(&self, post: Post) -> Result<Post, StoreError>;

    /// Replace the post stored at `old_id`, which may move it to a new id.
    async fn update(&self, old_id: &PostId, post: Post) -> Result<(), StoreError>;

    async fn delete(&self, id: &PostId) -> Result<(), StoreError>;

    async fn get(&self, id: &PostId) -> Result<Post, StoreError>;

    async fn search(&self, request: &FilterRequest) -> Result<SearchResults, StoreError>;

    async fn list_taxonomies(&self) -> Result<Vec<String>, StoreError>;

    /// Live terms of `taxonomy` in ascending order.
    async fn list_terms(&self, taxonomy: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_term_counts(taxonomy)
            .await?
            .into_iter()
            .map(|count| count.term)
            .collect())
    }

    async fn list_term_counts(&self, taxonomy: &str) -> Result<Vec<TaxonomyCount>, StoreError>;
}
