//! Telemetry gathering for one resource.
//!
//! Every (target, capacity type, metric) query is issued at once: a table
//! with two indexes costs twelve concurrent calls, joined before anything
//! is projected.

use futures_util::future::try_join_all;

use capscale_core::{
    CapacityType, ConsumedThroughput, IndexTelemetry, MetricsSource, ResourceDescription,
    ResourceTelemetry, RunSettings, SampleKind, SampleQuery, SampleWindow, ThrottledEvents,
};
use capscale_metrics::{CallKind, RunMetrics};
use capscale_policy::project_window;

use crate::error::{RunError, RunResult};

/// Fetch and project consumed capacity and throttle rates for a resource
/// and each of its indexes.
pub async fn fetch_telemetry(
    source: &dyn MetricsSource,
    description: &ResourceDescription,
    settings: &RunSettings,
    metrics: &RunMetrics,
) -> RunResult<ResourceTelemetry> {
    let resource = description.name.as_str();

    let table = fetch_target(source, resource, None, settings, metrics);
    let indexes = try_join_all(description.indexes.iter().map(|index| {
        let index = Some(index.name.as_str());
        fetch_target(source, resource, index, settings, metrics)
    }));
    let ((consumed, throttled), index_rates) = tokio::try_join!(table, indexes)?;

    let indexes = description
        .indexes
        .iter()
        .zip(index_rates)
        .map(|(index, (consumed, throttled))| IndexTelemetry {
            name: index.name.clone(),
            consumed,
            throttled,
        })
        .collect();

    Ok(ResourceTelemetry {
        resource: resource.to_string(),
        consumed,
        throttled,
        indexes,
    })
}

async fn fetch_target(
    source: &dyn MetricsSource,
    resource: &str,
    index: Option<&str>,
    settings: &RunSettings,
    metrics: &RunMetrics,
) -> RunResult<(ConsumedThroughput, ThrottledEvents)> {
    let query = |capacity: CapacityType, window: &SampleWindow| SampleQuery {
        resource: resource.to_string(),
        index: index.map(str::to_string),
        capacity,
        window_minutes: window.window_minutes(),
        bucket_minutes: window.bucket_minutes,
    };
    let consumed_window = &settings.consumption_window;
    let throttle_window = &settings.throttle_window;

    let consumed = |capacity: CapacityType| {
        let q = query(capacity, consumed_window);
        rate(source, SampleKind::Consumed, q, consumed_window, metrics)
    };
    let throttled = |capacity: CapacityType| {
        let q = query(capacity, throttle_window);
        rate(source, SampleKind::Throttled, q, throttle_window, metrics)
    };

    let (consumed_read, consumed_write, throttled_read, throttled_write) = tokio::try_join!(
        consumed(CapacityType::Read),
        consumed(CapacityType::Write),
        throttled(CapacityType::Read),
        throttled(CapacityType::Write),
    )?;

    Ok((
        ConsumedThroughput {
            read_units: consumed_read,
            write_units: consumed_write,
        },
        ThrottledEvents {
            read_per_minute: throttled_read,
            write_per_minute: throttled_write,
        },
    ))
}

/// Peak per-second rate over the window for one query. Consumption and
/// throttle counters are projected the same way.
async fn rate(
    source: &dyn MetricsSource,
    kind: SampleKind,
    query: SampleQuery,
    window: &SampleWindow,
    metrics: &RunMetrics,
) -> RunResult<f64> {
    let samples = metrics
        .timed(CallKind::MetricSamples, async {
            match kind {
                SampleKind::Consumed => source.consumption_samples(&query).await,
                SampleKind::Throttled => source.throttle_samples(&query).await,
            }
        })
        .await
        .map_err(|err| RunError::Telemetry {
            resource: query.resource.clone(),
            index: query.index.clone(),
            capacity: query.capacity,
            kind,
            source: err,
        })?;

    Ok(project_window(&samples, window))
}
