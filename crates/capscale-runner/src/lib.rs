//! capscale-runner — the capscale run orchestrator.
//!
//! Wires the collaborator traits, the decision engine, the update
//! executor and a per-run metrics sink into a single run, and repeats
//! runs on an interval until shut down.
//!
//! # Run
//!
//! ```text
//! list_resource_names
//!   └── per resource, concurrently
//!         ├── describe_resource
//!         ├── fetch_telemetry (every target × capacity × metric, concurrently)
//!         └── plan_resource
//! planned updates
//!   ├── ≤ direct_update_limit → apply_direct, all at once
//!   └── otherwise             → UpdateExecutor (pool_capacity workers)
//! RunSummary → logged, metrics reset
//! ```

pub mod error;
pub mod runner;
pub mod telemetry;

pub use error::{RunError, RunResult};
pub use runner::{PlanOutcome, ResourceReport, RunReport, Runner, UpdateReport, UpdateStatus};
pub use telemetry::fetch_telemetry;
