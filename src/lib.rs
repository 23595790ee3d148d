//! A derived, queryable index of markdown posts.
//!
//! The source of truth is a [`PostSource`](application::source::PostSource), normally a
//! markdown tree on disk. A [`Store`](application::repos::Store) mirrors it for filtered,
//! sorted and paginated queries plus taxonomy listings, and the
//! [`SyncCoordinator`](application::sync::SyncCoordinator) keeps the two consistent.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
