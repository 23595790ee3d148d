//! Injected sink for conditions that are reported rather than returned.

use std::fmt::Debug;

use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::application::repos::StoreError;
use crate::application::sync::{SyncError, SyncReport};
use crate::domain::PostId;

pub const METRIC_SYNC_ITEMS_TOTAL: &str = "postindex_sync_items_total";
pub const METRIC_SYNC_FAILURES_TOTAL: &str = "postindex_sync_failures_total";
pub const METRIC_CACHE_REFILL_TOTAL: &str = "postindex_cache_refill_total";
pub const METRIC_CACHE_REFILL_FAILED_TOTAL: &str = "postindex_cache_refill_failed_total";
pub const METRIC_SEARCH_INDEX_STALE_TOTAL: &str = "postindex_search_index_stale_total";
pub const METRIC_TAXONOMY_DRIFT_TOTAL: &str = "postindex_taxonomy_drift_total";
pub const METRIC_COMPENSATION_FAILED_TOTAL: &str = "postindex_compensation_failed_total";

/// Every method defaults to doing nothing.
pub trait CacheObserver: Send + Sync + Debug {
    /// A read fell through to the source and the store was refilled.
    fn cache_refilled(&self, _id: &PostId) {}

    /// A read fell through to the source and writing it back into the store failed.
    fn refill_failed(&self, _id: &PostId, _error: &StoreError) {}

    fn sync_item_failed(&self, _id: &PostId, _error: &SyncError) {}

    /// The canonical records committed but the secondary search index did not follow.
    fn search_index_stale(&self, _id: &PostId, _op: &'static str, _message: &str) {}

    /// A decrement found no count to decrement.
    fn taxonomy_drift(&self, _taxonomy: &str, _term: &str) {}

    /// A compensating action failed; the source and the store now disagree about `id`.
    fn compensation_failed(&self, _id: &PostId, _error: &SyncError) {}

    fn sync_finished(&self, _report: &SyncReport) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}

/// Reports through `tracing` events and `metrics` counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn cache_refilled(&self, id: &PostId) {
        counter!(METRIC_CACHE_REFILL_TOTAL).increment(1);
        debug!(target: "postindex::sync", post_id = %id, "store refilled from source");
    }

    fn refill_failed(&self, id: &PostId, error: &StoreError) {
        counter!(METRIC_CACHE_REFILL_FAILED_TOTAL).increment(1);
        warn!(
            target: "postindex::sync",
            post_id = %id,
            error = %error,
            "failed to refill store after source read"
        );
    }

    fn sync_item_failed(&self, id: &PostId, error: &SyncError) {
        counter!(METRIC_SYNC_FAILURES_TOTAL).increment(1);
        warn!(
            target: "postindex::sync",
            post_id = %id,
            error = %error,
            "skipping post during resync"
        );
    }

    fn search_index_stale(&self, id: &PostId, op: &'static str, message: &str) {
        counter!(METRIC_SEARCH_INDEX_STALE_TOTAL, "op" => op).increment(1);
        warn!(
            target: "postindex::store",
            post_id = %id,
            op,
            error = message,
            hint = "search results may lag until the next resync",
            "search index update failed after records committed"
        );
    }

    fn taxonomy_drift(&self, taxonomy: &str, term: &str) {
        counter!(METRIC_TAXONOMY_DRIFT_TOTAL).increment(1);
        warn!(
            target: "postindex::store",
            taxonomy,
            term,
            "decrement found no taxonomy count"
        );
    }

    fn compensation_failed(&self, id: &PostId, error: &SyncError) {
        counter!(METRIC_COMPENSATION_FAILED_TOTAL).increment(1);
        error!(
            target: "postindex::sync",
            post_id = %id,
            error = %error,
            "compensating action failed; resync required"
        );
    }

    fn sync_finished(&self, report: &SyncReport) {
        counter!(METRIC_SYNC_ITEMS_TOTAL, "result" => "created").increment(report.created as u64);
        counter!(METRIC_SYNC_ITEMS_TOTAL, "result" => "updated").increment(report.updated as u64);
        info!(
            target: "postindex::sync",
            created = report.created,
            updated = report.updated,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "resync finished"
        );
    }
}
