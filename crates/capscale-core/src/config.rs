//! capscale.toml policy configuration.
//!
//! The policy is declarative data: per capacity type a [`CapacityConfig`]
//! with hard bounds and optional increment/decrement [`AdjustmentConfig`]
//! blocks. The decision engine interprets it; nothing in here executes.
//!
//! ```toml
//! [settings]
//! pool_capacity = 10
//!
//! [default.read_capacity]
//! min = 1
//! max = 100
//!
//! [default.read_capacity.increment.when]
//! utilisation_is_above_percent = 90
//!
//! [default.read_capacity.increment.by]
//! units = 3
//!
//! [tables.orders.indexes.by-customer.write_capacity]
//! max = 20
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::CapacityType;

// ── Policy ─────────────────────────────────────────────────────────

/// Trigger conditions for an adjustment. Unset fields never fire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhenConfig {
    pub utilisation_is_above_percent: Option<f64>,
    pub utilisation_is_below_percent: Option<f64>,
    /// Increment only.
    pub throttled_events_per_minute_is_above: Option<f64>,
    pub after_last_increment_minutes: Option<u32>,
    pub after_last_decrement_minutes: Option<u32>,
    /// Decrement only: smallest change worth spending a daily decrease on.
    pub unit_adjustment_greater_than: Option<u64>,
}

/// Relative adjustment strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByConfig {
    pub provisioned_percent: Option<f64>,
    pub consumed_percent: Option<f64>,
    pub units: Option<u64>,
    /// Increment only: `throttled_rate * multiplier` extra units.
    pub throttled_events_with_multiplier: Option<f64>,
}

/// Absolute adjustment strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToConfig {
    pub provisioned_percent: Option<f64>,
    pub consumed_percent: Option<f64>,
    pub units: Option<u64>,
}

/// One direction (increment or decrement) of a capacity policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustmentConfig {
    #[serde(default)]
    pub when: WhenConfig,
    pub by: Option<ByConfig>,
    pub to: Option<ToConfig>,
}

/// Policy for one capacity type of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityConfig {
    pub min: Option<u64>,
    pub max: Option<u64>,
    /// `None` disables increments.
    pub increment: Option<AdjustmentConfig>,
    /// `None` disables decrements.
    pub decrement: Option<AdjustmentConfig>,
}

impl CapacityConfig {
    /// Lower bound for any computed value: `min`, never below 1.
    pub fn floor(&self) -> u64 {
        self.min.unwrap_or(1).max(1)
    }
}

/// Read and write policy for one resource or index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionerConfig {
    #[serde(default)]
    pub read_capacity: CapacityConfig,
    #[serde(default)]
    pub write_capacity: CapacityConfig,
}

impl ProvisionerConfig {
    pub fn capacity(&self, capacity: CapacityType) -> &CapacityConfig {
        match capacity {
            CapacityType::Read => &self.read_capacity,
            CapacityType::Write => &self.write_capacity,
        }
    }

    /// The stock policy applied when no `[default]` table is given.
    ///
    /// Grow quickly on high utilisation or any throttling, shrink to
    /// current consumption on low utilisation, and only spend a daily
    /// decrease on a change of more than 3 units.
    pub fn stock() -> Self {
        let capacity = CapacityConfig {
            min: Some(1),
            max: Some(100),
            increment: Some(AdjustmentConfig {
                when: WhenConfig {
                    utilisation_is_above_percent: Some(90.0),
                    throttled_events_per_minute_is_above: Some(0.0),
                    after_last_increment_minutes: Some(3),
                    ..Default::default()
                },
                by: Some(ByConfig {
                    units: Some(3),
                    ..Default::default()
                }),
                to: Some(ToConfig {
                    consumed_percent: Some(130.0),
                    ..Default::default()
                }),
            }),
            decrement: Some(AdjustmentConfig {
                when: WhenConfig {
                    utilisation_is_below_percent: Some(30.0),
                    after_last_increment_minutes: Some(60),
                    after_last_decrement_minutes: Some(60),
                    unit_adjustment_greater_than: Some(3),
                    ..Default::default()
                },
                by: None,
                to: Some(ToConfig {
                    consumed_percent: Some(100.0),
                    ..Default::default()
                }),
            }),
        };

        Self {
            read_capacity: capacity.clone(),
            write_capacity: capacity,
        }
    }
}

/// Per-table overrides. Unset capacity types fall back to the default policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub read_capacity: Option<CapacityConfig>,
    pub write_capacity: Option<CapacityConfig>,
    /// Index-specific policies. Indexes not listed use the table's policy.
    #[serde(default)]
    pub indexes: HashMap<String, ProvisionerConfig>,
}

// ── Run settings ───────────────────────────────────────────────────

/// Lookback window for a metrics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleWindow {
    pub buckets: u32,
    pub bucket_minutes: u32,
}

impl SampleWindow {
    pub fn window_minutes(&self) -> u32 {
        self.buckets * self.bucket_minutes
    }

    pub fn bucket_seconds(&self) -> f64 {
        f64::from(self.bucket_minutes) * 60.0
    }
}

/// Tuning for the run loop and update executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Concurrent in-flight mutations allowed by the control plane.
    pub pool_capacity: usize,
    pub settle_poll_interval_ms: u64,
    pub settle_max_attempts: u32,
    /// Batches at or below this size bypass the pool.
    pub direct_update_limit: usize,
    pub consumption_window: SampleWindow,
    pub throttle_window: SampleWindow,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            pool_capacity: 10,
            settle_poll_interval_ms: 1000,
            settle_max_attempts: 10,
            direct_update_limit: 10,
            consumption_window: SampleWindow {
                buckets: 5,
                bucket_minutes: 1,
            },
            throttle_window: SampleWindow {
                buckets: 1,
                bucket_minutes: 1,
            },
        }
    }
}

impl RunSettings {
    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms)
    }
}

// ── Top level ──────────────────────────────────────────────────────

/// A complete capscale configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapscaleConfig {
    #[serde(default)]
    pub settings: RunSettings,
    #[serde(default = "ProvisionerConfig::stock")]
    pub default: ProvisionerConfig,
    #[serde(default)]
    pub tables: HashMap<String, TableConfig>,
}

impl Default for CapscaleConfig {
    fn default() -> Self {
        Self {
            settings: RunSettings::default(),
            default: ProvisionerConfig::stock(),
            tables: HashMap::new(),
        }
    }
}

impl CapscaleConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: CapscaleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Policy for a resource's own throughput.
    pub fn for_resource(&self, resource: &str) -> ProvisionerConfig {
        match self.tables.get(resource) {
            Some(table) => ProvisionerConfig {
                read_capacity: table
                    .read_capacity
                    .clone()
                    .unwrap_or_else(|| self.default.read_capacity.clone()),
                write_capacity: table
                    .write_capacity
                    .clone()
                    .unwrap_or_else(|| self.default.write_capacity.clone()),
            },
            None => self.default.clone(),
        }
    }

    /// Policy for a secondary index: its own entry if present, otherwise
    /// the owning resource's policy.
    pub fn for_index(&self, resource: &str, index: &str) -> ProvisionerConfig {
        self.tables
            .get(resource)
            .and_then(|t| t.indexes.get(index))
            .cloned()
            .unwrap_or_else(|| self.for_resource(resource))
    }

    /// Reject settings and policies the engine cannot honour, and
    /// `when` fields placed on a direction that never evaluates them.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_settings(&self.settings)?;
        validate_provisioner("default", &self.default)?;

        for (name, table) in &self.tables {
            let path = format!("tables.{name}");
            if let Some(read) = &table.read_capacity {
                validate_capacity(&format!("{path}.read_capacity"), read)?;
            }
            if let Some(write) = &table.write_capacity {
                validate_capacity(&format!("{path}.write_capacity"), write)?;
            }
            for (index, config) in &table.indexes {
                validate_provisioner(&format!("{path}.indexes.{index}"), config)?;
            }
        }
        Ok(())
    }
}

fn validate_settings(settings: &RunSettings) -> ConfigResult<()> {
    if settings.pool_capacity == 0 {
        return Err(ConfigError::invalid(
            "settings.pool_capacity",
            "must be at least 1",
        ));
    }
    if settings.settle_max_attempts == 0 {
        return Err(ConfigError::invalid(
            "settings.settle_max_attempts",
            "must be at least 1",
        ));
    }
    for (name, window) in [
        ("consumption_window", settings.consumption_window),
        ("throttle_window", settings.throttle_window),
    ] {
        if window.buckets == 0 || window.bucket_minutes == 0 {
            return Err(ConfigError::invalid(
                format!("settings.{name}"),
                "buckets and bucket_minutes must be at least 1",
            ));
        }
    }
    Ok(())
}

fn validate_provisioner(path: &str, config: &ProvisionerConfig) -> ConfigResult<()> {
    validate_capacity(&format!("{path}.read_capacity"), &config.read_capacity)?;
    validate_capacity(&format!("{path}.write_capacity"), &config.write_capacity)
}

fn validate_capacity(path: &str, config: &CapacityConfig) -> ConfigResult<()> {
    if config.min == Some(0) {
        return Err(ConfigError::invalid(
            format!("{path}.min"),
            "must be at least 1",
        ));
    }
    if let (Some(min), Some(max)) = (config.min, config.max)
        && min > max
    {
        return Err(ConfigError::invalid(
            path,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }

    if let Some(increment) = &config.increment {
        let path = format!("{path}.increment");
        validate_adjustment(&path, increment)?;
        reject_field(
            &path,
            "when.utilisation_is_below_percent",
            increment.when.utilisation_is_below_percent.is_some(),
        )?;
        reject_field(
            &path,
            "when.unit_adjustment_greater_than",
            increment.when.unit_adjustment_greater_than.is_some(),
        )?;
    }

    if let Some(decrement) = &config.decrement {
        let path = format!("{path}.decrement");
        validate_adjustment(&path, decrement)?;
        reject_field(
            &path,
            "when.utilisation_is_above_percent",
            decrement.when.utilisation_is_above_percent.is_some(),
        )?;
        reject_field(
            &path,
            "when.throttled_events_per_minute_is_above",
            decrement.when.throttled_events_per_minute_is_above.is_some(),
        )?;
        reject_field(
            &path,
            "by.throttled_events_with_multiplier",
            decrement
                .by
                .as_ref()
                .is_some_and(|b| b.throttled_events_with_multiplier.is_some()),
        )?;
    }
    Ok(())
}

fn validate_adjustment(path: &str, config: &AdjustmentConfig) -> ConfigResult<()> {
    let when = &config.when;
    let mut numbers = vec![
        ("when.utilisation_is_above_percent", when.utilisation_is_above_percent),
        ("when.utilisation_is_below_percent", when.utilisation_is_below_percent),
        ("when.throttled_events_per_minute_is_above", when.throttled_events_per_minute_is_above),
    ];
    if let Some(by) = &config.by {
        numbers.push(("by.provisioned_percent", by.provisioned_percent));
        numbers.push(("by.consumed_percent", by.consumed_percent));
        numbers.push(("by.throttled_events_with_multiplier", by.throttled_events_with_multiplier));
    }
    if let Some(to) = &config.to {
        numbers.push(("to.provisioned_percent", to.provisioned_percent));
        numbers.push(("to.consumed_percent", to.consumed_percent));
    }

    for (field, value) in numbers {
        if let Some(v) = value
            && (!v.is_finite() || v < 0.0)
        {
            return Err(ConfigError::invalid(
                format!("{path}.{field}"),
                format!("must be a non-negative number, got {v}"),
            ));
        }
    }
    Ok(())
}

fn reject_field(path: &str, field: &str, present: bool) -> ConfigResult<()> {
    if present {
        return Err(ConfigError::invalid(
            format!("{path}.{field}"),
            "has no effect in this direction",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_stock_policy_and_default_settings() {
        let config = CapscaleConfig::from_toml_str("").unwrap();
        assert_eq!(config.settings, RunSettings::default());
        assert_eq!(config.default, ProvisionerConfig::stock());
        assert!(config.tables.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let toml = r#"
            [settings]
            pool_capacity = 5
            settle_poll_interval_ms = 250

            [default.read_capacity]
            min = 2
            max = 50

            [default.read_capacity.increment.when]
            utilisation_is_above_percent = 90

            [default.read_capacity.increment.by]
            units = 3

            [default.read_capacity.decrement.when]
            utilisation_is_below_percent = 30
            unit_adjustment_greater_than = 2

            [default.read_capacity.decrement.to]
            consumed_percent = 100

            [tables.orders.write_capacity]
            max = 10

            [tables.orders.indexes.by-customer.read_capacity]
            max = 20
        "#;

        let config = CapscaleConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.settings.pool_capacity, 5);
        assert_eq!(config.settings.settle_max_attempts, 10);
        assert_eq!(config.settings.settle_poll_interval(), Duration::from_millis(250));

        let read = &config.default.read_capacity;
        assert_eq!(read.min, Some(2));
        assert_eq!(
            read.increment.as_ref().unwrap().by.as_ref().unwrap().units,
            Some(3)
        );
        assert!(config.default.write_capacity.increment.is_none());

        let orders = config.for_resource("orders");
        assert_eq!(orders.read_capacity.max, Some(50));
        assert_eq!(orders.write_capacity.max, Some(10));

        let index = config.for_index("orders", "by-customer");
        assert_eq!(index.read_capacity.max, Some(20));
        assert_eq!(index.write_capacity, CapacityConfig::default());

        let other_index = config.for_index("orders", "by-date");
        assert_eq!(other_index, orders);
    }

    #[test]
    fn unknown_table_gets_default_policy() {
        let config = CapscaleConfig::default();
        assert_eq!(config.for_resource("anything"), ProvisionerConfig::stock());
        assert_eq!(config.for_index("anything", "idx"), ProvisionerConfig::stock());
    }

    #[test]
    fn rejects_min_above_max() {
        let toml = r#"
            [default.read_capacity]
            min = 20
            max = 10
        "#;
        let err = CapscaleConfig::from_toml_str(toml).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref path, .. } if path == "default.read_capacity")
        );
    }

    #[test]
    fn rejects_zero_min() {
        let toml = r#"
            [default.write_capacity]
            min = 0
        "#;
        assert!(CapscaleConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_below_threshold_on_increment() {
        let toml = r#"
            [default.read_capacity.increment.when]
            utilisation_is_below_percent = 10
        "#;
        let err = CapscaleConfig::from_toml_str(toml).unwrap_err();
        match err {
            ConfigError::Invalid { path, .. } => assert_eq!(
                path,
                "default.read_capacity.increment.when.utilisation_is_below_percent"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_throttle_fields_on_decrement() {
        let toml = r#"
            [tables.orders.indexes.by-date.write_capacity.decrement.when]
            throttled_events_per_minute_is_above = 1
        "#;
        let err = CapscaleConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("tables.orders.indexes.by-date"));

        let toml = r#"
            [default.read_capacity.decrement.by]
            throttled_events_with_multiplier = 2
        "#;
        assert!(CapscaleConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_negative_percentages() {
        let toml = r#"
            [default.read_capacity.increment.by]
            provisioned_percent = -5
        "#;
        assert!(CapscaleConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = r#"
            [default.read_capacity.increment.when]
            utilization_is_above_percent = 90
        "#;
        assert!(matches!(
            CapscaleConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_zero_pool_capacity() {
        let toml = r#"
            [settings]
            pool_capacity = 0
        "#;
        assert!(CapscaleConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn stock_policy_is_valid() {
        assert!(CapscaleConfig::default().validate().is_ok());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capscale.toml");
        std::fs::write(&path, "[settings]\nsettle_max_attempts = 3\n").unwrap();

        let config = CapscaleConfig::from_file(&path).unwrap();
        assert_eq!(config.settings.settle_max_attempts, 3);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            CapscaleConfig::from_file(&missing),
            Err(ConfigError::Read(_))
        ));
    }

    #[test]
    fn floor_is_never_below_one() {
        assert_eq!(CapacityConfig::default().floor(), 1);
        let config = CapacityConfig {
            min: Some(5),
            ..Default::default()
        };
        assert_eq!(config.floor(), 5);
    }

    #[test]
    fn demo_policy_is_valid() {
        let config =
            CapscaleConfig::from_toml_str(include_str!("../../../demos/capscale.toml")).unwrap();
        let index = config.for_index("orders", "by-customer");
        assert_eq!(index.read_capacity.max, Some(40));
        assert_eq!(config.for_resource("orders").write_capacity.max, Some(50));
    }
}
