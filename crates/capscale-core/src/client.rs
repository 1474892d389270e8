//! Collaborator interfaces consumed by the control loop.
//!
//! The control plane (list / describe / update) and the metrics source
//! (time-bucketed statistics) are external services. Implementations are
//! plain request/response clients; any retry or backoff they perform is
//! their own business and invisible to the decision engine.

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::types::{ResourceDescription, Sample, SampleQuery, UpdateRequest};

/// Resource description and mutation surface.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List every resource the control plane knows about.
    async fn list_resource_names(&self) -> ClientResult<Vec<String>>;

    /// Describe a resource and its secondary indexes.
    async fn describe_resource(&self, name: &str) -> ClientResult<ResourceDescription>;

    /// Apply a capacity update. Returns the description as of acceptance,
    /// which is normally still in a non-settled status.
    async fn update_resource(&self, request: &UpdateRequest) -> ClientResult<ResourceDescription>;
}

/// Time-series statistics lookup.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Sum of consumed capacity units per bucket.
    async fn consumption_samples(&self, query: &SampleQuery) -> ClientResult<Vec<Sample>>;

    /// Sum of throttled requests per bucket.
    async fn throttle_samples(&self, query: &SampleQuery) -> ClientResult<Vec<Sample>>;
}
