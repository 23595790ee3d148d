//! Store contract, query semantics and the coordinator that keeps the index in step with
//! the source.

pub mod error;
pub mod filter;
pub mod observer;
pub mod pagination;
pub mod repos;
pub mod source;
pub mod sync;
pub mod taxonomy;
