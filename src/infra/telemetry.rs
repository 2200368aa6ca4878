use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    cache::{
        METRIC_BYPASS, METRIC_HIT, METRIC_MISS, METRIC_STORE, METRIC_STORE_FAILED,
        METRIC_STORED_BYTES,
    },
    config::{LogFormat, LoggingSettings},
};

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

/// Register descriptions for the page cache metrics with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(METRIC_HIT, Unit::Count, "Total number of pages served from the cache.");
        describe_counter!(
            METRIC_MISS,
            Unit::Count,
            "Total number of cache lookups that found no stored page."
        );
        describe_counter!(
            METRIC_BYPASS,
            Unit::Count,
            "Total number of renders served to authenticated visitors without capture."
        );
        describe_counter!(METRIC_STORE, Unit::Count, "Total number of pages stored.");
        describe_counter!(
            METRIC_STORE_FAILED,
            Unit::Count,
            "Total number of page stores rejected by the storage backend."
        );
        describe_histogram!(
            METRIC_STORED_BYTES,
            Unit::Bytes,
            "Size of stored pages in bytes, including the appended comment block."
        );
    });
}
