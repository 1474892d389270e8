//! Run error types.
//!
//! Every variant names the resource (and index and capacity type where one
//! applies) so a failed plan can be traced back from the log alone.

use thiserror::Error;

use capscale_core::{CapacityType, ClientError, ConfigError, SampleKind};
use capscale_executor::UpdateError;
use capscale_policy::PlanError;

/// Errors raised by the orchestrator.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to list resources: {0}")]
    List(#[source] ClientError),

    #[error("failed to describe {resource}: {source}")]
    Describe {
        resource: String,
        #[source]
        source: ClientError,
    },

    #[error(
        "failed to fetch {kind} {capacity} samples for {}: {source}",
        target(.resource, .index.as_deref())
    )]
    Telemetry {
        resource: String,
        index: Option<String>,
        capacity: CapacityType,
        kind: SampleKind,
        #[source]
        source: ClientError,
    },

    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("update failed: {0}")]
    Update(#[from] UpdateError),
}

fn target(resource: &str, index: Option<&str>) -> String {
    match index {
        Some(index) => format!("{resource}.{index}"),
        None => resource.to_string(),
    }
}

pub type RunResult<T> = Result<T, RunError>;
