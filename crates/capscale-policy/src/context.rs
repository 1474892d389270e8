//! Per-evaluation adjustment context.

use capscale_core::{
    AdjustmentConfig, CapacityConfig, CapacityType, Direction, ProvisionerConfig,
    ThroughputSnapshot,
};

/// Everything needed to decide one (capacity type, direction) pair for a
/// resource or index. Built fresh from a snapshot for every evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AdjustmentContext<'a> {
    pub resource: &'a str,
    pub index: Option<&'a str>,
    pub capacity: CapacityType,
    pub direction: Direction,
    pub provisioned: u64,
    pub consumed: f64,
    pub throttled: f64,
    pub utilisation_percent: f64,
    pub capacity_config: &'a CapacityConfig,
    /// `None` when this direction is disabled.
    pub adjustment: Option<&'a AdjustmentConfig>,
}

impl<'a> AdjustmentContext<'a> {
    pub fn new(
        snapshot: &'a ThroughputSnapshot,
        policy: &'a ProvisionerConfig,
        capacity: CapacityType,
        direction: Direction,
    ) -> Self {
        let capacity_config = policy.capacity(capacity);
        let adjustment = match direction {
            Direction::Increment => capacity_config.increment.as_ref(),
            Direction::Decrement => capacity_config.decrement.as_ref(),
        };
        let provisioned = snapshot.provisioned.units(capacity);
        let consumed = snapshot.consumed.units(capacity);

        Self {
            resource: &snapshot.resource,
            index: snapshot.index.as_deref(),
            capacity,
            direction,
            provisioned,
            consumed,
            throttled: snapshot.throttled.rate(capacity),
            utilisation_percent: utilisation_percent(provisioned, consumed),
            capacity_config,
            adjustment,
        }
    }

    /// `resource` or `resource.index`, for log lines.
    pub fn display_name(&self) -> String {
        match self.index {
            Some(index) => format!("{}.{}", self.resource, index),
            None => self.resource.to_string(),
        }
    }
}

/// `consumed / provisioned × 100`. Zero provisioned capacity is 0% when
/// idle and unbounded otherwise.
pub fn utilisation_percent(provisioned: u64, consumed: f64) -> f64 {
    if provisioned == 0 {
        return if consumed > 0.0 { f64::INFINITY } else { 0.0 };
    }
    consumed / provisioned as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use capscale_core::{ConsumedThroughput, ProvisionedThroughput, ThrottledEvents};

    #[test]
    fn picks_dimension_and_direction() {
        let snapshot = ThroughputSnapshot {
            resource: "orders".to_string(),
            index: None,
            provisioned: ProvisionedThroughput {
                read_units: 10,
                write_units: 4,
                ..Default::default()
            },
            consumed: ConsumedThroughput {
                read_units: 5.0,
                write_units: 1.0,
            },
            throttled: ThrottledEvents {
                read_per_minute: 0.0,
                write_per_minute: 7.0,
            },
        };
        let policy = ProvisionerConfig::stock();

        let ctx =
            AdjustmentContext::new(&snapshot, &policy, CapacityType::Write, Direction::Decrement);
        assert_eq!(ctx.provisioned, 4);
        assert_eq!(ctx.consumed, 1.0);
        assert_eq!(ctx.throttled, 7.0);
        assert_eq!(ctx.utilisation_percent, 25.0);
        assert_eq!(ctx.adjustment, policy.write_capacity.decrement.as_ref());
        assert_eq!(ctx.display_name(), "orders");
    }

    #[test]
    fn utilisation_handles_zero_provisioned() {
        assert_eq!(utilisation_percent(0, 0.0), 0.0);
        assert!(utilisation_percent(0, 1.0).is_infinite());
        assert_eq!(utilisation_percent(5, 5.0), 100.0);
    }
}
