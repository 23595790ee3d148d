//! Markdown tree on the local disk, laid out as `<root>/<post type>/<slug>.md`.
//!
//! A post may also live at `<root>/<post type>/<slug>/index.md`. The walk slugifies file
//! names; single-post operations address the `<slug>.md` and `<slug>/index.md` paths.

mod document;
mod paths;

pub use document::{FrontmatterFormat, estimate_read_time, etag};

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::application::source::{PostSource, PostStream, SourceError};
use crate::domain::{DomainError, Post, PostId};

use self::paths::{EXTENSION, SlugPath, file_date, slugify_path};

#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
    buffer: usize,
    frontmatter: FrontmatterFormat,
}

impl LocalFileSystem {
    /// `buffer` bounds how many parsed posts may wait for the consumer during a walk.
    pub fn new(root: impl Into<PathBuf>, buffer: usize) -> Self {
        Self {
            root: root.into(),
            buffer: buffer.max(1),
            frontmatter: FrontmatterFormat::default(),
        }
    }

    /// Frontmatter syntax for documents this source writes.
    pub fn with_frontmatter(mut self, format: FrontmatterFormat) -> Self {
        self.frontmatter = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `id`. Slugs may contain `/` but never climb out of the root.
    pub fn path_for(&self, id: &PostId) -> Result<PathBuf, SourceError> {
        let relative = Path::new(&id.post_type).join(format!("{}.{EXTENSION}", id.slug));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(SourceError::Invalid {
                path: relative,
                source: DomainError::invalid_identity(format!("`{id}` escapes the content root")),
            });
        }
        Ok(self.root.join(relative))
    }

    /// The existing document for `id`: `<slug>.md`, else `<slug>/index.md`. When neither
    /// exists the `<slug>.md` path is returned.
    async fn resolve(&self, id: &PostId) -> Result<PathBuf, SourceError> {
        let path = self.path_for(id)?;
        if exists(&path).await? {
            return Ok(path);
        }
        let index = path.with_extension("").join(format!("index.{EXTENSION}"));
        if exists(&index).await? {
            return Ok(index);
        }
        Ok(path)
    }

    async fn ensure_parent(path: &Path) -> Result<(), SourceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SourceError::io(parent, err))?;
        }
        Ok(())
    }
}

async fn exists(path: &Path) -> Result<bool, SourceError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|err| SourceError::io(path, err))
}

/// File date carried by the last slug segment.
fn file_date_of(id: &PostId) -> Option<Date> {
    id.slug.rsplit('/').next().and_then(file_date)
}

fn modified_at(metadata: &std::fs::Metadata) -> Option<OffsetDateTime> {
    metadata.modified().ok().map(OffsetDateTime::from)
}

fn finish(mut post: Post, slug: &SlugPath, metadata: &std::fs::Metadata) -> Post {
    post.set_id(&slug.id);
    post.file_date = slug.file_date;
    post.created = modified_at(metadata);
    post.updated = post.created;
    post
}

fn load_blocking(root: &Path, path: &Path, slug: &SlugPath) -> Result<Post, SourceError> {
    let raw = std::fs::read_to_string(path).map_err(|err| SourceError::io(path, err))?;
    let metadata = std::fs::metadata(path).map_err(|err| SourceError::io(path, err))?;
    let relative = path.strip_prefix(root).unwrap_or(path);
    Ok(finish(document::parse(&raw, relative)?, slug, &metadata))
}

fn walk_blocking(
    root: PathBuf,
    posts: mpsc::Sender<Post>,
    errors: mpsc::Sender<SourceError>,
    cancel: CancellationToken,
) {
    for entry in WalkDir::new(&root).sort_by_file_name() {
        if cancel.is_cancelled() {
            debug!(target: "postindex::source", "walk cancelled");
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                let _ = errors.blocking_send(SourceError::io(path, io::Error::from(err)));
                return;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(slug) = slugify_path(&root, entry.path()) else {
            debug!(
                target: "postindex::source",
                path = %entry.path().display(),
                "Skipping file outside the content layout"
            );
            continue;
        };
        match load_blocking(&root, entry.path(), &slug) {
            Ok(post) => {
                if posts.blocking_send(post).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = errors.blocking_send(err);
                return;
            }
        }
    }
}

#[async_trait]
impl PostSource for LocalFileSystem {
    fn walk(&self, cancel: CancellationToken) -> PostStream {
        let (post_tx, posts) = mpsc::channel(self.buffer);
        let (error_tx, errors) = mpsc::channel(1);
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_blocking(root, post_tx, error_tx, cancel));
        PostStream { posts, errors }
    }

    async fn read(&self, id: &PostId) -> Result<Post, SourceError> {
        let path = self.resolve(id).await?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::not_found(id));
            }
            Err(err) => return Err(SourceError::io(&path, err)),
        };
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| SourceError::io(&path, err))?;
        let relative = path.strip_prefix(&self.root).unwrap_or(path.as_path());
        let slug = SlugPath {
            id: id.clone(),
            file_date: file_date_of(id),
        };
        Ok(finish(document::parse(&raw, relative)?, &slug, &metadata))
    }

    async fn write(&self, post: &Post) -> Result<(), SourceError> {
        let path = self.resolve(&post.id()).await?;
        let text = document::render(post, &path, self.frontmatter)?;
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|err| SourceError::io(&path, err))
    }

    async fn delete(&self, id: &PostId) -> Result<(), SourceError> {
        let path = self.resolve(id).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(SourceError::not_found(id)),
            Err(err) => Err(SourceError::io(&path, err)),
        }
    }

    async fn move_post(&self, from: &PostId, to: &PostId) -> Result<(), SourceError> {
        let source = self.resolve(from).await?;
        let target = self.resolve(to).await?;
        if !exists(&source).await? {
            return Err(SourceError::not_found(from));
        }
        if exists(&target).await? {
            return Err(SourceError::already_exists(to));
        }
        Self::ensure_parent(&target).await?;
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|err| SourceError::io(&source, err))
    }
}
