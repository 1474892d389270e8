//! Domain types for capscale.
//!
//! These types describe the provisioned-capacity resources the control loop
//! observes (tables and their secondary indexes), the telemetry gathered
//! for them, and the update requests it produces. All types are
//! serializable so fixtures and run reports can be written as JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a provisioned-capacity resource (a table).
pub type ResourceName = String;

/// Name of a secondary index within a resource.
pub type IndexName = String;

/// Maximum number of capacity decreases the control plane permits per day.
pub const DAILY_DECREMENT_QUOTA: u32 = 4;

// ── Capacity dimensions ────────────────────────────────────────────

/// Which throughput dimension a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityType {
    Read,
    Write,
}

impl CapacityType {
    pub const ALL: [CapacityType; 2] = [CapacityType::Read, CapacityType::Write];

    pub fn is_read(self) -> bool {
        matches!(self, CapacityType::Read)
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityType::Read => f.write_str("read"),
            CapacityType::Write => f.write_str("write"),
        }
    }
}

/// Direction of a capacity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increment,
    Decrement,
}

impl Direction {
    /// `+1.0` for increments, `-1.0` for decrements.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Increment => 1.0,
            Direction::Decrement => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increment => f.write_str("increment"),
            Direction::Decrement => f.write_str("decrement"),
        }
    }
}

// ── Resource description ───────────────────────────────────────────

/// Control-plane status of a resource or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    Updating,
    Deleting,
    Active,
}

impl ResourceStatus {
    /// Whether no mutation is in flight.
    pub fn is_settled(self) -> bool {
        matches!(self, ResourceStatus::Active)
    }
}

/// Provisioned throughput as reported by the control plane, including the
/// rate-limiting history the control plane keeps for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedThroughput {
    pub read_units: u64,
    pub write_units: u64,
    /// When capacity was last increased. `None` if never.
    #[serde(default)]
    pub last_increase: Option<DateTime<Utc>>,
    /// When capacity was last decreased. `None` if never.
    #[serde(default)]
    pub last_decrease: Option<DateTime<Utc>>,
    /// Decreases already spent today, in `[0, DAILY_DECREMENT_QUOTA]`.
    #[serde(default)]
    pub decreases_today: u32,
}

impl ProvisionedThroughput {
    pub fn units(&self, capacity: CapacityType) -> u64 {
        match capacity {
            CapacityType::Read => self.read_units,
            CapacityType::Write => self.write_units,
        }
    }

    /// The plain read/write unit pair.
    pub fn throughput(&self) -> Throughput {
        Throughput {
            read_units: self.read_units,
            write_units: self.write_units,
        }
    }
}

/// A secondary index as described by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    pub name: IndexName,
    pub status: ResourceStatus,
    pub provisioned: ProvisionedThroughput,
}

/// A resource as described by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub name: ResourceName,
    pub status: ResourceStatus,
    pub provisioned: ProvisionedThroughput,
    #[serde(default)]
    pub indexes: Vec<IndexDescription>,
}

impl ResourceDescription {
    /// The resource is settled when it and every index report active.
    pub fn is_settled(&self) -> bool {
        self.status.is_settled() && self.indexes.iter().all(|i| i.status.is_settled())
    }

    /// Provisioned units summed over the resource and all its indexes.
    pub fn total_provisioned(&self) -> Throughput {
        self.indexes
            .iter()
            .fold(self.provisioned.throughput(), |acc, index| Throughput {
                read_units: acc.read_units + index.provisioned.read_units,
                write_units: acc.write_units + index.provisioned.write_units,
            })
    }
}

// ── Telemetry ──────────────────────────────────────────────────────

/// Consumed capacity units, projected from the metrics source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumedThroughput {
    pub read_units: f64,
    pub write_units: f64,
}

impl ConsumedThroughput {
    pub fn units(&self, capacity: CapacityType) -> f64 {
        match capacity {
            CapacityType::Read => self.read_units,
            CapacityType::Write => self.write_units,
        }
    }
}

/// Throttled request rates, projected like consumption as the peak
/// per-second rate in the throttle window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottledEvents {
    pub read_per_minute: f64,
    pub write_per_minute: f64,
}

impl ThrottledEvents {
    pub fn rate(&self, capacity: CapacityType) -> f64 {
        match capacity {
            CapacityType::Read => self.read_per_minute,
            CapacityType::Write => self.write_per_minute,
        }
    }
}

/// Projected telemetry for one secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTelemetry {
    pub name: IndexName,
    pub consumed: ConsumedThroughput,
    pub throttled: ThrottledEvents,
}

/// Projected telemetry for a resource and all its indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTelemetry {
    pub resource: ResourceName,
    pub consumed: ConsumedThroughput,
    pub throttled: ThrottledEvents,
    #[serde(default)]
    pub indexes: Vec<IndexTelemetry>,
}

impl ResourceTelemetry {
    pub fn index(&self, name: &str) -> Option<&IndexTelemetry> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// One time-bucketed sum returned by the metrics source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub sum: f64,
}

/// Which metric a sample query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Consumed,
    Throttled,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Consumed => f.write_str("consumed"),
            SampleKind::Throttled => f.write_str("throttled"),
        }
    }
}

/// A request for time-bucketed samples of one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleQuery {
    pub resource: ResourceName,
    pub index: Option<IndexName>,
    pub capacity: CapacityType,
    /// Total lookback window.
    pub window_minutes: u32,
    /// Width of each bucket.
    pub bucket_minutes: u32,
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Immutable per-run view of one resource or index, the sole input to the
/// decision logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSnapshot {
    pub resource: ResourceName,
    pub index: Option<IndexName>,
    pub provisioned: ProvisionedThroughput,
    pub consumed: ConsumedThroughput,
    pub throttled: ThrottledEvents,
}

impl ThroughputSnapshot {
    /// `resource` or `resource.index`, for log lines.
    pub fn display_name(&self) -> String {
        match &self.index {
            Some(index) => format!("{}.{}", self.resource, index),
            None => self.resource.clone(),
        }
    }
}

// ── Updates ────────────────────────────────────────────────────────

/// A plain read/write unit pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub read_units: u64,
    pub write_units: u64,
}

impl Throughput {
    pub fn units(&self, capacity: CapacityType) -> u64 {
        match capacity {
            CapacityType::Read => self.read_units,
            CapacityType::Write => self.write_units,
        }
    }

    pub fn set_units(&mut self, capacity: CapacityType, units: u64) {
        match capacity {
            CapacityType::Read => self.read_units = units,
            CapacityType::Write => self.write_units = units,
        }
    }
}

/// New throughput for one secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUpdate {
    pub index: IndexName,
    pub throughput: Throughput,
}

/// A merged capacity update for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub resource: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<Throughput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_updates: Vec<IndexUpdate>,
}

impl UpdateRequest {
    /// Whether the request changes nothing.
    pub fn is_empty(&self) -> bool {
        self.throughput.is_none() && self.index_updates.is_empty()
    }
}
