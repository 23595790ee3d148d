use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::observer::{
    METRIC_CACHE_REFILL_FAILED_TOTAL, METRIC_CACHE_REFILL_TOTAL, METRIC_COMPENSATION_FAILED_TOTAL,
    METRIC_SEARCH_INDEX_STALE_TOTAL, METRIC_SYNC_FAILURES_TOTAL, METRIC_SYNC_ITEMS_TOTAL,
    METRIC_TAXONOMY_DRIFT_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every counter [`TracingObserver`] emits.
///
/// [`TracingObserver`]: crate::application::observer::TracingObserver
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_SYNC_ITEMS_TOTAL,
            Unit::Count,
            "Total number of posts processed by full synchronizations."
        );
        describe_counter!(
            METRIC_SYNC_FAILURES_TOTAL,
            Unit::Count,
            "Total number of posts that failed to synchronize."
        );
        describe_counter!(
            METRIC_CACHE_REFILL_TOTAL,
            Unit::Count,
            "Total number of store refills after a read fell through to the source."
        );
        describe_counter!(
            METRIC_CACHE_REFILL_FAILED_TOTAL,
            Unit::Count,
            "Total number of store refills that failed."
        );
        describe_counter!(
            METRIC_SEARCH_INDEX_STALE_TOTAL,
            Unit::Count,
            "Total number of search index updates that failed after records committed."
        );
        describe_counter!(
            METRIC_TAXONOMY_DRIFT_TOTAL,
            Unit::Count,
            "Total number of taxonomy decrements that found no stored count."
        );
        describe_counter!(
            METRIC_COMPENSATION_FAILED_TOTAL,
            Unit::Count,
            "Total number of compensating actions that failed."
        );
    });
}
