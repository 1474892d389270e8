//! MemoryControlPlane — an in-process stand-in for the control plane and
//! metrics source.
//!
//! Keeps resource descriptions and scripted samples in memory and applies
//! the same bookkeeping the real control plane does on update: increases
//! stamp `last_increase`, decreases stamp `last_decrease` and spend one of
//! the day's decreases, and the resource reports `updating` for a
//! configurable number of describe calls before it settles. Used by tests
//! and by `capscaled simulate`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ControlPlane, MetricsSource};
use crate::error::{ClientError, ClientResult};
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SampleKey {
    kind: SampleKind,
    resource: ResourceName,
    index: Option<IndexName>,
    capacity: CapacityType,
}

#[derive(Debug)]
struct MemoryResource {
    description: ResourceDescription,
    /// Describe calls left before the resource settles.
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<ResourceName, MemoryResource>,
    samples: HashMap<SampleKey, Vec<Sample>>,
    failures: HashSet<(&'static str, ResourceName)>,
    settle_after_polls: u32,
    in_flight: usize,
    max_in_flight: usize,
    updates: Vec<UpdateRequest>,
}

/// Thread-safe in-memory control plane. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describe calls a resource stays `updating` after an update.
    pub fn with_settle_after_polls(self, polls: u32) -> Self {
        self.lock().settle_after_polls = polls;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a resource description.
    pub fn put_resource(&self, description: ResourceDescription) {
        let mut inner = self.lock();
        debug!(resource = %description.name, "memory resource stored");
        inner.resources.insert(
            description.name.clone(),
            MemoryResource {
                description,
                pending_polls: 0,
            },
        );
    }

    /// Replace the samples returned for one metric.
    pub fn put_samples(
        &self,
        kind: SampleKind,
        resource: &str,
        index: Option<&str>,
        capacity: CapacityType,
        samples: Vec<Sample>,
    ) {
        let key = SampleKey {
            kind,
            resource: resource.to_string(),
            index: index.map(str::to_string),
            capacity,
        };
        self.lock().samples.insert(key, samples);
    }

    /// Script one-minute bucket sums ending now, oldest first.
    pub fn put_sums(
        &self,
        kind: SampleKind,
        resource: &str,
        index: Option<&str>,
        capacity: CapacityType,
        sums: &[f64],
    ) {
        let now = Utc::now();
        let len = sums.len() as i64;
        let samples = sums
            .iter()
            .enumerate()
            .map(|(i, &sum)| Sample {
                timestamp: now - Duration::minutes(len - i as i64),
                sum,
            })
            .collect();
        self.put_samples(kind, resource, index, capacity, samples);
    }

    /// Make every subsequent `operation` call for `resource` fail.
    ///
    /// Operations: `list`, `describe`, `update`, `consumption`, `throttle`.
    pub fn fail(&self, operation: &'static str, resource: &str) {
        self.lock()
            .failures
            .insert((operation, resource.to_string()));
    }

    /// Current description, without counting as a settle poll.
    pub fn resource(&self, name: &str) -> Option<ResourceDescription> {
        self.lock()
            .resources
            .get(name)
            .map(|r| r.description.clone())
    }

    /// Every update accepted so far, in order.
    pub fn updates(&self) -> Vec<UpdateRequest> {
        self.lock().updates.clone()
    }

    /// Updates accepted but not yet observed settled.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Highest number of simultaneously unsettled updates observed.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    /// Build a control plane from a JSON fixture file.
    pub fn from_fixture_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: MemoryFixture = serde_json::from_str(&content)?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn from_fixture(fixture: MemoryFixture) -> Self {
        let plane = Self::new().with_settle_after_polls(fixture.settle_after_polls);
        for table in fixture.tables {
            let name = table.description.name.clone();
            plane.put_resource(table.description);
            for series in table.samples {
                plane.put_sums(
                    series.kind,
                    &name,
                    series.index.as_deref(),
                    series.capacity,
                    &series.sums,
                );
            }
        }
        plane
    }

    fn check_failure(inner: &Inner, operation: &'static str, resource: &str) -> ClientResult<()> {
        if inner.failures.contains(&(operation, resource.to_string())) {
            return Err(ClientError::request(operation, resource, "injected failure"));
        }
        Ok(())
    }

    fn samples(&self, kind: SampleKind, query: &SampleQuery) -> ClientResult<Vec<Sample>> {
        let inner = self.lock();
        let operation = match kind {
            SampleKind::Consumed => "consumption",
            SampleKind::Throttled => "throttle",
        };
        Self::check_failure(&inner, operation, &query.resource)?;

        let key = SampleKey {
            kind,
            resource: query.resource.clone(),
            index: query.index.clone(),
            capacity: query.capacity,
        };
        Ok(inner.samples.get(&key).cloned().unwrap_or_default())
    }
}

/// Apply new units to one provisioned record, stamping history. Returns
/// an error if a decrease is requested with the day's quota spent.
fn apply_throughput(
    resource: &str,
    provisioned: &mut ProvisionedThroughput,
    target: Throughput,
) -> ClientResult<()> {
    let now = Utc::now();
    let current = provisioned.throughput();
    let increased = CapacityType::ALL
        .iter()
        .any(|&c| target.units(c) > current.units(c));
    let decreased = CapacityType::ALL
        .iter()
        .any(|&c| target.units(c) < current.units(c));

    if decreased && provisioned.decreases_today >= DAILY_DECREMENT_QUOTA {
        return Err(ClientError::request(
            "update",
            resource,
            "daily decrease quota exhausted",
        ));
    }

    provisioned.read_units = target.read_units;
    provisioned.write_units = target.write_units;
    if increased {
        provisioned.last_increase = Some(now);
    }
    if decreased {
        provisioned.last_decrease = Some(now);
        provisioned.decreases_today += 1;
    }
    Ok(())
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn list_resource_names(&self) -> ClientResult<Vec<String>> {
        let inner = self.lock();
        Self::check_failure(&inner, "list", "*")?;
        Ok(inner.resources.keys().cloned().collect())
    }

    async fn describe_resource(&self, name: &str) -> ClientResult<ResourceDescription> {
        let mut inner = self.lock();
        Self::check_failure(&inner, "describe", name)?;

        let resource = inner
            .resources
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;

        let mut settled_now = false;
        if resource.pending_polls > 0 {
            resource.pending_polls -= 1;
            if resource.pending_polls == 0 {
                resource.description.status = ResourceStatus::Active;
                for index in &mut resource.description.indexes {
                    index.status = ResourceStatus::Active;
                }
                settled_now = true;
            }
        }
        let description = resource.description.clone();

        if settled_now {
            inner.in_flight = inner.in_flight.saturating_sub(1);
            debug!(resource = %name, "memory resource settled");
        }
        Ok(description)
    }

    async fn update_resource(&self, request: &UpdateRequest) -> ClientResult<ResourceDescription> {
        let mut inner = self.lock();
        let name = request.resource.as_str();
        Self::check_failure(&inner, "update", name)?;

        let settle_after = inner.settle_after_polls;
        let resource = inner
            .resources
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;

        if resource.pending_polls > 0 || !resource.description.is_settled() {
            return Err(ClientError::request(
                "update",
                name,
                "resource is being updated",
            ));
        }

        // Validate every target before mutating anything.
        let mut staged = resource.description.clone();
        if let Some(throughput) = request.throughput {
            apply_throughput(name, &mut staged.provisioned, throughput)?;
        }
        for update in &request.index_updates {
            let index = staged
                .indexes
                .iter_mut()
                .find(|i| i.name == update.index)
                .ok_or_else(|| ClientError::NotFound(format!("{name}.{}", update.index)))?;
            apply_throughput(name, &mut index.provisioned, update.throughput)?;
            if settle_after > 0 {
                index.status = ResourceStatus::Updating;
            }
        }
        if settle_after > 0 {
            staged.status = ResourceStatus::Updating;
        }

        resource.description = staged.clone();
        resource.pending_polls = settle_after;

        if settle_after > 0 {
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
        }
        inner.updates.push(request.clone());
        debug!(resource = %name, "memory resource updated");
        Ok(staged)
    }
}

#[async_trait]
impl MetricsSource for MemoryControlPlane {
    async fn consumption_samples(&self, query: &SampleQuery) -> ClientResult<Vec<Sample>> {
        self.samples(SampleKind::Consumed, query)
    }

    async fn throttle_samples(&self, query: &SampleQuery) -> ClientResult<Vec<Sample>> {
        self.samples(SampleKind::Throttled, query)
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

/// JSON fixture describing a simulated account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFixture {
    #[serde(default)]
    pub settle_after_polls: u32,
    pub tables: Vec<FixtureTable>,
}

/// One table in a fixture, with its scripted metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureTable {
    pub description: ResourceDescription,
    #[serde(default)]
    pub samples: Vec<FixtureSeries>,
}

/// One-minute bucket sums for one metric, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSeries {
    pub kind: SampleKind,
    #[serde(default)]
    pub index: Option<IndexName>,
    pub capacity: CapacityType,
    pub sums: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, read: u64, write: u64) -> ResourceDescription {
        ResourceDescription {
            name: name.to_string(),
            status: ResourceStatus::Active,
            provisioned: ProvisionedThroughput {
                read_units: read,
                write_units: write,
                ..Default::default()
            },
            indexes: vec![IndexDescription {
                name: "by-date".to_string(),
                status: ResourceStatus::Active,
                provisioned: ProvisionedThroughput {
                    read_units: read,
                    write_units: write,
                    ..Default::default()
                },
            }],
        }
    }

    fn request(name: &str, read: u64, write: u64) -> UpdateRequest {
        UpdateRequest {
            resource: name.to_string(),
            throughput: Some(Throughput {
                read_units: read,
                write_units: write,
            }),
            index_updates: Vec::new(),
        }
    }

    #[tokio::test]
    async fn lists_resources_in_name_order() {
        let plane = MemoryControlPlane::new();
        plane.put_resource(table("b", 1, 1));
        plane.put_resource(table("a", 1, 1));

        assert_eq!(plane.list_resource_names().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn update_stamps_history() {
        let plane = MemoryControlPlane::new();
        plane.put_resource(table("orders", 10, 10));

        plane.update_resource(&request("orders", 20, 5)).await.unwrap();
        let desc = plane.resource("orders").unwrap();

        assert_eq!(desc.provisioned.read_units, 20);
        assert_eq!(desc.provisioned.write_units, 5);
        assert!(desc.provisioned.last_increase.is_some());
        assert!(desc.provisioned.last_decrease.is_some());
        assert_eq!(desc.provisioned.decreases_today, 1);
        assert_eq!(plane.updates().len(), 1);
    }

    #[tokio::test]
    async fn decrease_beyond_quota_is_rejected() {
        let plane = MemoryControlPlane::new();
        let mut desc = table("orders", 10, 10);
        desc.provisioned.decreases_today = DAILY_DECREMENT_QUOTA;
        plane.put_resource(desc);

        let err = plane.update_resource(&request("orders", 5, 10)).await.unwrap_err();
        assert!(matches!(err, ClientError::Request { operation: "update", .. }));

        // Increases are still accepted.
        plane.update_resource(&request("orders", 15, 10)).await.unwrap();
    }

    #[tokio::test]
    async fn settles_after_configured_polls() {
        let plane = MemoryControlPlane::new().with_settle_after_polls(2);
        plane.put_resource(table("orders", 10, 10));

        let accepted = plane.update_resource(&request("orders", 20, 10)).await.unwrap();
        assert_eq!(accepted.status, ResourceStatus::Updating);
        assert_eq!(plane.in_flight(), 1);

        // Concurrent mutation of an unsettled resource is refused.
        assert!(plane.update_resource(&request("orders", 30, 10)).await.is_err());

        assert!(!plane.describe_resource("orders").await.unwrap().is_settled());
        assert!(plane.describe_resource("orders").await.unwrap().is_settled());
        assert_eq!(plane.in_flight(), 0);
        assert_eq!(plane.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn index_update_for_unknown_index_fails_without_mutating() {
        let plane = MemoryControlPlane::new();
        plane.put_resource(table("orders", 10, 10));

        let req = UpdateRequest {
            resource: "orders".to_string(),
            throughput: Some(Throughput {
                read_units: 50,
                write_units: 10,
            }),
            index_updates: vec![IndexUpdate {
                index: "missing".to_string(),
                throughput: Throughput::default(),
            }],
        };
        assert!(matches!(
            plane.update_resource(&req).await,
            Err(ClientError::NotFound(_))
        ));
        assert_eq!(plane.resource("orders").unwrap().provisioned.read_units, 10);
    }

    #[tokio::test]
    async fn injected_failures_are_scoped_to_resource() {
        let plane = MemoryControlPlane::new();
        plane.put_resource(table("a", 1, 1));
        plane.put_resource(table("b", 1, 1));
        plane.fail("describe", "a");

        assert!(plane.describe_resource("a").await.is_err());
        assert!(plane.describe_resource("b").await.is_ok());
    }

    #[tokio::test]
    async fn returns_scripted_samples() {
        let plane = MemoryControlPlane::new();
        plane.put_sums(
            SampleKind::Consumed,
            "orders",
            Some("by-date"),
            CapacityType::Read,
            &[60.0, 120.0],
        );

        let query = SampleQuery {
            resource: "orders".to_string(),
            index: Some("by-date".to_string()),
            capacity: CapacityType::Read,
            window_minutes: 5,
            bucket_minutes: 1,
        };
        let samples = plane.consumption_samples(&query).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].timestamp < samples[1].timestamp);

        assert!(plane.throttle_samples(&query).await.unwrap().is_empty());
    }

    #[test]
    fn fixture_builds_control_plane() {
        let json = r#"{
            "settle_after_polls": 1,
            "tables": [{
                "description": {
                    "name": "orders",
                    "status": "active",
                    "provisioned": { "read_units": 5, "write_units": 5 }
                },
                "samples": [
                    { "kind": "consumed", "capacity": "read", "sums": [300, 300] }
                ]
            }]
        }"#;
        let fixture: MemoryFixture = serde_json::from_str(json).unwrap();
        let plane = MemoryControlPlane::from_fixture(fixture);

        let desc = plane.resource("orders").unwrap();
        assert_eq!(desc.provisioned.read_units, 5);
        assert!(desc.indexes.is_empty());
    }

    #[test]
    fn demo_fixture_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/tables.json");
        let plane = MemoryControlPlane::from_fixture_file(&path).unwrap();

        let orders = plane.resource("orders").unwrap();
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(orders.indexes[0].provisioned.read_units, 4);
        assert!(plane.resource("sessions").is_some());
    }
}
