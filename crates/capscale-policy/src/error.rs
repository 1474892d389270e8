//! Planning error types.

use thiserror::Error;

/// Result type alias for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors that abandon the plan for a single resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("no consumed capacity telemetry for index {index} of {resource}")]
    MissingIndexTelemetry { resource: String, index: String },

    #[error("telemetry for {telemetry} does not belong to {resource}")]
    MismatchedTelemetry { resource: String, telemetry: String },
}
