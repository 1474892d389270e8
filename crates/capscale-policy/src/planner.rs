//! Resource update planning.
//!
//! For each capacity type an increment is evaluated first and a decrement
//! only when no increment is required. The resource and every secondary
//! index are planned independently and merged into one [`UpdateRequest`].

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use capscale_core::{
    CapacityType, CapscaleConfig, Direction, IndexUpdate, ProvisionerConfig, ResourceDescription,
    ResourceTelemetry, Throughput, ThroughputSnapshot, UpdateRequest,
};

use crate::context::AdjustmentContext;
use crate::error::{PlanError, PlanResult};
use crate::evaluator;

/// New throughput for one snapshot, or `None` when nothing should change.
pub fn plan_throughput(
    snapshot: &ThroughputSnapshot,
    policy: &ProvisionerConfig,
    now: DateTime<FixedOffset>,
) -> Option<Throughput> {
    let current = snapshot.provisioned.throughput();
    let mut planned = current;

    for capacity in CapacityType::ALL {
        if let Some(units) = plan_capacity(snapshot, policy, capacity, now) {
            planned.set_units(capacity, units);
        }
    }

    (planned != current).then_some(planned)
}

fn plan_capacity(
    snapshot: &ThroughputSnapshot,
    policy: &ProvisionerConfig,
    capacity: CapacityType,
    now: DateTime<FixedOffset>,
) -> Option<u64> {
    for direction in [Direction::Increment, Direction::Decrement] {
        let ctx = AdjustmentContext::new(snapshot, policy, capacity, direction);
        if let Some(decision) = evaluator::evaluate(snapshot, &ctx, now)
            && decision.is_required()
        {
            return Some(decision.candidate);
        }
    }
    None
}

/// Plan the merged update for a resource and its indexes.
///
/// Indexes use their own policy when `config` has one and the resource's
/// otherwise. An index with no telemetry record fails the whole resource.
pub fn plan_resource(
    description: &ResourceDescription,
    telemetry: &ResourceTelemetry,
    config: &CapscaleConfig,
    now: DateTime<FixedOffset>,
) -> PlanResult<Option<UpdateRequest>> {
    if telemetry.resource != description.name {
        return Err(PlanError::MismatchedTelemetry {
            resource: description.name.clone(),
            telemetry: telemetry.resource.clone(),
        });
    }

    let snapshot = ThroughputSnapshot {
        resource: description.name.clone(),
        index: None,
        provisioned: description.provisioned.clone(),
        consumed: telemetry.consumed,
        throttled: telemetry.throttled,
    };
    let throughput = plan_throughput(&snapshot, &config.for_resource(&description.name), now);

    let mut index_updates = Vec::new();
    for index in &description.indexes {
        let Some(index_telemetry) = telemetry.index(&index.name) else {
            return Err(PlanError::MissingIndexTelemetry {
                resource: description.name.clone(),
                index: index.name.clone(),
            });
        };
        let snapshot = ThroughputSnapshot {
            resource: description.name.clone(),
            index: Some(index.name.clone()),
            provisioned: index.provisioned.clone(),
            consumed: index_telemetry.consumed,
            throttled: index_telemetry.throttled,
        };
        let policy = config.for_index(&description.name, &index.name);
        if let Some(throughput) = plan_throughput(&snapshot, &policy, now) {
            index_updates.push(IndexUpdate {
                index: index.name.clone(),
                throughput,
            });
        }
    }

    let request = UpdateRequest {
        resource: description.name.clone(),
        throughput,
        index_updates,
    };
    if request.is_empty() {
        debug!(resource = %description.name, "no capacity change planned");
        return Ok(None);
    }
    debug!(
        resource = %description.name,
        throughput = ?request.throughput,
        indexes = request.index_updates.len(),
        "capacity update planned"
    );
    Ok(Some(request))
}
