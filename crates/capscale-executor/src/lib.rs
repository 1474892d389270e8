//! capscale-executor — rate-limited application of capacity updates.
//!
//! The control plane caps how many resources may be mid-update across the
//! whole account. [`UpdateExecutor`] enforces that cap with a fixed pool of
//! workers fed by a bounded channel; a worker only takes its next job once
//! the previous resource reports a steady state again.
//!
//! # Job lifecycle
//!
//! ```text
//! submit(request) ──▶ queue ──▶ worker
//!                                 ├── update_resource
//!                                 ├── describe_resource  (every poll interval,
//!                                 │                       at most N attempts)
//!                                 └── reply ──▶ UpdateOutcome
//! ```
//!
//! [`apply_direct`] skips the pool and the settle poll for batches small
//! enough not to approach the cap.

pub mod error;
pub mod executor;

pub use error::{UpdateError, UpdateResult};
pub use executor::{UpdateExecutor, UpdateOutcome, apply_direct};
