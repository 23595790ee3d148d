//! Contract for the source of truth the store mirrors.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{DomainError, Post, PostId};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("post `{id}` not found in source")]
    NotFound { id: PostId },
    #[error("post `{id}` already exists in source")]
    AlreadyExists { id: PostId },
    #[error("io error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse `{}`: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid document `{}`: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: DomainError,
    },
}

impl SourceError {
    pub fn not_found(id: &PostId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    pub fn already_exists(id: &PostId) -> Self {
        Self::AlreadyExists { id: id.clone() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, SourceError::AlreadyExists { .. })
    }
}

/// Receivers for one walk. Both close once the walk finishes or is cancelled.
#[derive(Debug)]
pub struct PostStream {
    pub posts: mpsc::Receiver<Post>,
    pub errors: mpsc::Receiver<SourceError>,
}

impl PostStream {
    /// A stream with a single error and no posts.
    pub fn failed(error: SourceError) -> Self {
        let (_, posts) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);
        let _ = error_tx.try_send(error);
        Self { posts, errors }
    }
}

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Stream every post. Cancelling `cancel` stops the walk early.
    fn walk(&self, cancel: CancellationToken) -> PostStream;

    async fn read(&self, id: &PostId) -> Result<Post, SourceError>;

    /// Persist `post` at its own id, creating or replacing the document.
    async fn write(&self, post: &Post) -> Result<(), SourceError>;

    async fn delete(&self, id: &PostId) -> Result<(), SourceError>;

    /// Rename the document. Fails with `AlreadyExists` rather than replace another document.
    async fn move_post(&self, from: &PostId, to: &PostId) -> Result<(), SourceError>;
}
