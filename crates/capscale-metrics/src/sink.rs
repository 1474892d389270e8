//! Run metrics sink.
//!
//! Counters are atomics; timer samples sit behind a short-lived mutex that
//! is never held across an await.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use capscale_core::Throughput;

use crate::cost::monthly_estimated_cost;

/// Kind of timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallKind {
    /// A whole run, from listing to the last update.
    Run,
    ListResources,
    DescribeResource,
    /// Every telemetry fetch for one resource, joined.
    ConsumedCapacity,
    /// A single metrics-source query.
    MetricSamples,
    UpdateResource,
}

impl CallKind {
    pub fn name(self) -> &'static str {
        match self {
            CallKind::Run => "run",
            CallKind::ListResources => "list_resources",
            CallKind::DescribeResource => "describe_resource",
            CallKind::ConsumedCapacity => "consumed_capacity",
            CallKind::MetricSamples => "metric_samples",
            CallKind::UpdateResource => "update_resource",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TimerStats {
    count: u64,
    total: Duration,
    max: Duration,
}

/// Aggregated timings for one [`CallKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSummary {
    pub name: String,
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

/// Everything recorded during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Slowest mean first.
    pub timers: Vec<TimerSummary>,
    pub resources: u64,
    pub failed_resources: u64,
    pub planned_updates: u64,
    pub applied_updates: u64,
    pub failed_updates: u64,
    pub unsettled_updates: u64,
    pub total_provisioned: Throughput,
    pub monthly_estimated_cost: f64,
}

impl RunSummary {
    pub fn timer(&self, name: &str) -> Option<&TimerSummary> {
        self.timers.iter().find(|t| t.name == name)
    }
}

/// Metrics for a single run. Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct RunMetrics {
    timers: Mutex<HashMap<CallKind, TimerStats>>,
    resources: AtomicU64,
    failed_resources: AtomicU64,
    planned_updates: AtomicU64,
    applied_updates: AtomicU64,
    failed_updates: AtomicU64,
    unsettled_updates: AtomicU64,
    provisioned_read: AtomicU64,
    provisioned_write: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<CallKind, TimerStats>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one sample for `kind`.
    pub fn record_duration(&self, kind: CallKind, elapsed: Duration) {
        let mut timers = self.timers();
        let stats = timers.entry(kind).or_default();
        stats.count += 1;
        stats.total += elapsed;
        stats.max = stats.max.max(elapsed);
    }

    /// Await `fut`, recording how long it took under `kind`.
    pub async fn timed<F, T>(&self, kind: CallKind, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.record_duration(kind, started.elapsed());
        output
    }

    /// A resource was described; add its provisioned throughput (table
    /// plus indexes) to the run total.
    pub fn record_resource(&self, total_provisioned: Throughput) {
        self.resources.fetch_add(1, Ordering::Relaxed);
        self.provisioned_read
            .fetch_add(total_provisioned.read_units, Ordering::Relaxed);
        self.provisioned_write
            .fetch_add(total_provisioned.write_units, Ordering::Relaxed);
    }

    pub fn record_failed_resource(&self) {
        self.failed_resources.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planned_update(&self) {
        self.planned_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// An update was accepted; `settled` is false when the poll budget ran
    /// out first.
    pub fn record_applied_update(&self, settled: bool) {
        self.applied_updates.fetch_add(1, Ordering::Relaxed);
        if !settled {
            self.unsettled_updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failed_update(&self) {
        self.failed_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot everything recorded so far.
    pub fn summary(&self) -> RunSummary {
        let mut timers: Vec<TimerSummary> = self
            .timers()
            .iter()
            .map(|(kind, stats)| TimerSummary {
                name: kind.name().to_string(),
                count: stats.count,
                mean_ms: to_2dp(mean(stats).as_secs_f64() * 1000.0),
                max_ms: to_2dp(stats.max.as_secs_f64() * 1000.0),
            })
            .collect();
        timers.sort_by(|a, b| {
            b.mean_ms
                .total_cmp(&a.mean_ms)
                .then_with(|| a.name.cmp(&b.name))
        });

        let total_provisioned = Throughput {
            read_units: self.provisioned_read.load(Ordering::Relaxed),
            write_units: self.provisioned_write.load(Ordering::Relaxed),
        };

        RunSummary {
            timers,
            resources: self.resources.load(Ordering::Relaxed),
            failed_resources: self.failed_resources.load(Ordering::Relaxed),
            planned_updates: self.planned_updates.load(Ordering::Relaxed),
            applied_updates: self.applied_updates.load(Ordering::Relaxed),
            failed_updates: self.failed_updates.load(Ordering::Relaxed),
            unsettled_updates: self.unsettled_updates.load(Ordering::Relaxed),
            total_provisioned,
            monthly_estimated_cost: to_2dp(monthly_estimated_cost(total_provisioned)),
        }
    }

    /// Clear all timers and counters.
    pub fn reset(&self) {
        self.timers().clear();
        for counter in [
            &self.resources,
            &self.failed_resources,
            &self.planned_updates,
            &self.applied_updates,
            &self.failed_updates,
            &self.unsettled_updates,
            &self.provisioned_read,
            &self.provisioned_write,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        debug!("run metrics reset");
    }
}

fn mean(stats: &TimerStats) -> Duration {
    if stats.count == 0 {
        return Duration::ZERO;
    }
    stats.total.div_f64(stats.count as f64)
}

fn to_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
