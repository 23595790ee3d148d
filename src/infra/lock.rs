//! Poison-tolerant lock access for the in-memory store.
//!
//! A panic while a writer holds the lock leaves the map in whatever state the panicking
//! call reached. Callers keep serving from it and a resync restores it.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_guard<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        recovered(op, "read");
        poisoned.into_inner()
    })
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        recovered(op, "write");
        poisoned.into_inner()
    })
}

fn recovered(op: &'static str, mode: &'static str) {
    warn!(
        target: "postindex::store",
        op,
        lock_mode = mode,
        result = "poisoned_recovered",
        hint = "resync to rebuild the index if results look wrong",
        "Recovered from poisoned store lock"
    );
}
