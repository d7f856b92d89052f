use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_query_fetch_total",
            Unit::Count,
            "Total number of query fetches started, by key family and reason."
        );
        describe_counter!(
            "folio_query_fetch_failed_total",
            Unit::Count,
            "Total number of query fetches that ended in an error."
        );
        describe_counter!(
            "folio_query_fetch_discarded_total",
            Unit::Count,
            "Total number of fetch results dropped because a newer fetch superseded them."
        );
        describe_histogram!(
            "folio_query_fetch_ms",
            Unit::Milliseconds,
            "Query fetch latency in milliseconds."
        );
        describe_counter!(
            "folio_query_hit_total",
            Unit::Count,
            "Total number of subscriptions served from fresh cached data."
        );
        describe_counter!(
            "folio_query_invalidated_total",
            Unit::Count,
            "Total number of entries marked stale by invalidation."
        );
        describe_counter!(
            "folio_query_evict_total",
            Unit::Count,
            "Total number of entries evicted after the idle window."
        );
        describe_gauge!(
            "folio_query_entries",
            Unit::Count,
            "Current number of entries held by the query cache."
        );
        describe_counter!(
            "folio_mutation_total",
            Unit::Count,
            "Total number of mutations, by outcome."
        );
        describe_histogram!(
            "folio_mutation_ms",
            Unit::Milliseconds,
            "Mutation latency in milliseconds, invalidation included."
        );
    });
}
