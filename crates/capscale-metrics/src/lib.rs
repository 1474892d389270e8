//! capscale-metrics — per-run observability for the capscale loop.
//!
//! A [`RunMetrics`] sink is created for every run and handed to the
//! orchestrator. It records how long each kind of collaborator call took,
//! counts planned and applied updates, and accumulates the provisioned
//! throughput and estimated monthly cost of every resource seen. At run end
//! the orchestrator takes a [`RunSummary`] and resets the sink.
//!
//! # Architecture
//!
//! ```text
//! RunMetrics
//!   ├── timed(kind, fut)    ← wraps list / describe / telemetry / update calls
//!   ├── record_*()          ← update outcomes, provisioned throughput
//!   └── summary() → RunSummary ──┬── logged as JSON
//!                                └── render_prometheus() → text exposition
//! ```

pub mod cost;
pub mod prometheus;
pub mod sink;

pub use cost::monthly_estimated_cost;
pub use prometheus::render_prometheus;
pub use sink::{CallKind, RunMetrics, RunSummary, TimerSummary};
