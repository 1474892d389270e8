//! capscale-policy — the capacity decision engine.
//!
//! Turns a resource description plus projected telemetry into at most one
//! merged `UpdateRequest`. Everything here is pure: no I/O, and `now` is
//! always passed in so decisions are reproducible.
//!
//! # Decision pipeline
//!
//! ```text
//! samples ──project──▶ consumed / throttled rates
//!                            │
//! ThroughputSnapshot ──▶ AdjustmentContext (capacity × direction)
//!                            │
//!                  evaluator: wanted ∧ allowed
//!                     │            └── decrement: daily quota schedule
//!                     └── calculator: candidate value (computed once)
//!                            │
//!                  planner: increment before decrement, per index, merged
//! ```
//!
//! A decrement is only *allowed* once the next slot of the daily quota has
//! opened: the rest of the day up to 23:30 is split evenly among the
//! decreases still available, so the quota is not spent in one burst.

pub mod calculator;
pub mod clock;
pub mod context;
pub mod decrement;
pub mod error;
pub mod evaluator;
pub mod planner;
pub mod projector;

pub use calculator::compute;
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{AdjustmentContext, utilisation_percent};
pub use decrement::{is_decrement_allowed, next_allowed_decrement};
pub use error::{PlanError, PlanResult};
pub use evaluator::{AdjustmentDecision, evaluate, is_required};
pub use planner::{plan_resource, plan_throughput};
pub use projector::{project, project_window};
