use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_ENTRIES, METRIC_EVICTED_TOTAL, METRIC_FETCH_FAILED_TOTAL, METRIC_FETCH_TOTAL,
    METRIC_INDEX_DANGLING_TOTAL, METRIC_INVALIDATED_TOTAL, METRIC_LOOKUP_MS, METRIC_LOOKUP_TOTAL,
    METRIC_PURGED_TOTAL,
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Registers metric descriptions with the installed recorder. Safe to call
/// repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_LOOKUP_TOTAL,
            Unit::Count,
            "Total number of lookups, labelled by the path that served them."
        );
        describe_histogram!(
            METRIC_LOOKUP_MS,
            Unit::Milliseconds,
            "Lookup latency in milliseconds, labelled by the path that served them."
        );
        describe_counter!(
            METRIC_FETCH_TOTAL,
            Unit::Count,
            "Total number of remote source invocations."
        );
        describe_counter!(
            METRIC_FETCH_FAILED_TOTAL,
            Unit::Count,
            "Total number of remote fetches that failed or timed out."
        );
        describe_counter!(
            METRIC_INVALIDATED_TOTAL,
            Unit::Count,
            "Total number of entries removed by explicit invalidation."
        );
        describe_counter!(
            METRIC_EVICTED_TOTAL,
            Unit::Count,
            "Total number of entries evicted due to capacity."
        );
        describe_counter!(
            METRIC_PURGED_TOTAL,
            Unit::Count,
            "Total number of expired entries reclaimed."
        );
        describe_counter!(
            METRIC_INDEX_DANGLING_TOTAL,
            Unit::Count,
            "Total number of tag index references found pointing at missing keys."
        );
        describe_gauge!(
            METRIC_ENTRIES,
            Unit::Count,
            "Current number of entries physically held by the store."
        );
    });
}
