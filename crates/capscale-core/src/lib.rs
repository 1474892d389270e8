//! capscale-core — shared types for the capscale control loop.
//!
//! Defines the data the decision engine works on (resource descriptions,
//! projected telemetry, throughput snapshots, update requests), the
//! declarative capacity policy loaded from `capscale.toml`, and the
//! collaborator traits through which the loop reaches the outside world.
//!
//! # Architecture
//!
//! ```text
//! ControlPlane  (list / describe / update)  ─┐
//! MetricsSource (consumed / throttled sums) ─┴─ MemoryControlPlane (tests, simulation)
//!
//! CapscaleConfig
//!   ├── settings   (pool size, settle polling, sample windows)
//!   ├── default    (ProvisionerConfig → read/write CapacityConfig)
//!   └── tables.*   (per-table and per-index overrides)
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use client::{ControlPlane, MetricsSource};
pub use config::{
    AdjustmentConfig, ByConfig, CapacityConfig, CapscaleConfig, ProvisionerConfig, RunSettings,
    SampleWindow, TableConfig, ToConfig, WhenConfig,
};
pub use error::{ClientError, ClientResult, ConfigError, ConfigResult};
pub use memory::{MemoryControlPlane, MemoryFixture};
pub use types::*;
