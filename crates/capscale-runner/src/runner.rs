//! Run orchestrator.
//!
//! One run: list resources, describe each and gather its telemetry
//! concurrently, plan every resource, then apply the planned updates
//! directly (small batches) or through the [`UpdateExecutor`] pool.
//! A failure while describing, measuring or planning one resource is
//! recorded against that resource only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use capscale_core::{CapscaleConfig, ControlPlane, MetricsSource, UpdateRequest};
use capscale_executor::{UpdateExecutor, UpdateOutcome, UpdateResult, apply_direct};
use capscale_metrics::{CallKind, RunMetrics, RunSummary};
use capscale_policy::{Clock, SystemClock, plan_resource};

use crate::error::{RunError, RunResult};
use crate::telemetry::fetch_telemetry;

/// What happened to one resource during planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Unchanged,
    Planned { request: UpdateRequest },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub resource: String,
    #[serde(flatten)]
    pub outcome: PlanOutcome,
}

/// What happened to one planned update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateStatus {
    Applied { settled: bool, poll_attempts: u32 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub resource: String,
    #[serde(flatten)]
    pub status: UpdateStatus,
}

/// Result of a single run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<FixedOffset>,
    /// Whether updates went through the rate-limited pool.
    pub pooled: bool,
    /// In listing order.
    pub resources: Vec<ResourceReport>,
    pub updates: Vec<UpdateReport>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn failed_resources(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources
            .iter()
            .filter(|r| matches!(r.outcome, PlanOutcome::Failed { .. }))
    }

    pub fn planned(&self) -> impl Iterator<Item = &UpdateRequest> {
        self.resources.iter().filter_map(|r| match &r.outcome {
            PlanOutcome::Planned { request } => Some(request),
            _ => None,
        })
    }
}

/// Drives the capacity control loop.
pub struct Runner {
    control_plane: Arc<dyn ControlPlane>,
    metrics_source: Arc<dyn MetricsSource>,
    config: CapscaleConfig,
    clock: Arc<dyn Clock>,
}

impl Runner {
    /// Build a runner. The configuration is validated here so a bad policy
    /// stops the loop before any collaborator is called.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        metrics_source: Arc<dyn MetricsSource>,
        config: CapscaleConfig,
    ) -> RunResult<Self> {
        config.validate()?;
        Ok(Self {
            control_plane,
            metrics_source,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the wall clock, e.g. with a `FixedClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CapscaleConfig {
        &self.config
    }

    /// Execute one full run.
    ///
    /// Only a failure to list resources fails the run as a whole; every
    /// other error is reported against the resource it concerns.
    pub async fn run_once(&self) -> RunResult<RunReport> {
        let metrics = RunMetrics::new();
        let started = Instant::now();
        let now = self.clock.now();

        let names = metrics
            .timed(CallKind::ListResources, self.control_plane.list_resource_names())
            .await
            .map_err(RunError::List)?;
        info!(resources = names.len(), "planning capacity for resources");

        let plans = join_all(names.iter().map(|name| self.plan_one(name, now, &metrics))).await;

        let mut resources = Vec::with_capacity(names.len());
        let mut requests = Vec::new();
        for (name, plan) in names.into_iter().zip(plans) {
            let outcome = match plan {
                Ok(Some(request)) => {
                    metrics.record_planned_update();
                    requests.push(request.clone());
                    PlanOutcome::Planned { request }
                }
                Ok(None) => PlanOutcome::Unchanged,
                Err(e) => {
                    metrics.record_failed_resource();
                    error!(resource = %name, error = %e, "resource skipped this run");
                    PlanOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            resources.push(ResourceReport {
                resource: name,
                outcome,
            });
        }

        let pooled = requests.len() > self.config.settings.direct_update_limit;
        let updates = if requests.is_empty() {
            info!("no capacity updates required");
            Vec::new()
        } else {
            info!(updates = requests.len(), pooled, "applying capacity updates");
            self.apply(requests, pooled, &metrics).await
        };

        metrics.record_duration(CallKind::Run, started.elapsed());
        let summary = metrics.summary();
        match serde_json::to_string(&summary) {
            Ok(json) => info!(summary = %json, "run complete"),
            Err(e) => warn!(error = %e, "failed to serialise run summary"),
        }
        metrics.reset();

        Ok(RunReport {
            started_at: now,
            pooled,
            resources,
            updates,
            summary,
        })
    }

    async fn plan_one(
        &self,
        name: &str,
        now: DateTime<FixedOffset>,
        metrics: &RunMetrics,
    ) -> RunResult<Option<UpdateRequest>> {
        let description = metrics
            .timed(
                CallKind::DescribeResource,
                self.control_plane.describe_resource(name),
            )
            .await
            .map_err(|err| RunError::Describe {
                resource: name.to_string(),
                source: err,
            })?;
        metrics.record_resource(description.total_provisioned());

        let telemetry = metrics
            .timed(
                CallKind::ConsumedCapacity,
                fetch_telemetry(
                    self.metrics_source.as_ref(),
                    &description,
                    &self.config.settings,
                    metrics,
                ),
            )
            .await?;
        debug!(
            resource = %name,
            consumed = ?telemetry.consumed,
            throttled = ?telemetry.throttled,
            "telemetry projected"
        );

        Ok(plan_resource(&description, &telemetry, &self.config, now)?)
    }

    async fn apply(
        &self,
        requests: Vec<UpdateRequest>,
        pooled: bool,
        metrics: &RunMetrics,
    ) -> Vec<UpdateReport> {
        let results: Vec<(String, UpdateResult<UpdateOutcome>)> = if pooled {
            let executor =
                UpdateExecutor::start(Arc::clone(&self.control_plane), &self.config.settings);
            let executor_ref = &executor;
            let results = join_all(requests.into_iter().map(|request| async move {
                let resource = request.resource.clone();
                let result = metrics
                    .timed(CallKind::UpdateResource, executor_ref.submit(request))
                    .await;
                (resource, result)
            }))
            .await;
            executor.shutdown().await;
            results
        } else {
            let control_plane = self.control_plane.as_ref();
            join_all(requests.into_iter().map(|request| async move {
                let resource = request.resource.clone();
                let result = metrics
                    .timed(CallKind::UpdateResource, apply_direct(control_plane, request))
                    .await;
                (resource, result)
            }))
            .await
        };

        results
            .into_iter()
            .map(|(resource, result)| {
                let status = match result {
                    Ok(outcome) => {
                        // Direct updates are never polled, so they cannot be unsettled.
                        metrics.record_applied_update(outcome.settled || !pooled);
                        UpdateStatus::Applied {
                            settled: outcome.settled,
                            poll_attempts: outcome.poll_attempts,
                        }
                    }
                    Err(e) => {
                        metrics.record_failed_update();
                        let e = RunError::from(e);
                        error!(resource = %resource, error = %e, "capacity update failed");
                        UpdateStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                UpdateReport { resource, status }
            })
            .collect()
    }

    /// Run every `interval` until `shutdown` changes. A run in progress
    /// is finished before the loop exits.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "capscale runner started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "capscale run failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("capscale runner shutting down");
                    break;
                }
            }
        }
    }
}
