//! Core records and identity rules shared by every store and collaborator.

pub mod error;
pub mod post;
pub mod types;

pub use error::DomainError;
pub use post::{Post, PostId, parse_published};
pub use types::{ANY, PostStatus, PostTypes, Visibility};
