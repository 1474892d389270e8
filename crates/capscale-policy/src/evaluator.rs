//! Adjustment policy evaluation.
//!
//! An adjustment is *required* when it is both *wanted* (the business rule:
//! bounds and utilisation/throttle thresholds) and *allowed* (grace periods
//! and, for decrements, the daily decrement schedule). Every evaluation is
//! logged with all of its intermediate flags.

use chrono::{DateTime, FixedOffset};
use tracing::info;

use capscale_core::{Direction, ThroughputSnapshot};

use crate::calculator;
use crate::clock::local;
use crate::context::AdjustmentContext;
use crate::decrement::{self, grace_end};

/// Outcome of evaluating one (capacity type, direction) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentDecision {
    pub is_above_max: bool,
    pub is_below_min: bool,
    pub is_above_threshold: bool,
    pub is_below_threshold: bool,
    pub is_above_throttled_threshold: bool,
    /// Room left to move in this direction without crossing a bound.
    pub has_headroom: bool,
    pub is_after_last_decrease_grace: bool,
    pub is_after_last_increase_grace: bool,
    /// Always true for increments.
    pub is_decrement_allowed: bool,
    pub is_wanted: bool,
    pub is_allowed: bool,
    /// The value to apply if the adjustment goes ahead.
    pub candidate: u64,
}

impl AdjustmentDecision {
    pub fn is_required(&self) -> bool {
        self.is_wanted && self.is_allowed
    }
}

/// Evaluate `ctx` against `snapshot` at `now`.
///
/// Returns `None` when the context's direction is disabled; the decrement
/// schedule is never consulted in that case.
pub fn evaluate(
    snapshot: &ThroughputSnapshot,
    ctx: &AdjustmentContext<'_>,
    now: DateTime<FixedOffset>,
) -> Option<AdjustmentDecision> {
    let adjustment = ctx.adjustment?;
    let when = &adjustment.when;
    let bounds = ctx.capacity_config;
    let p = ctx.provisioned;
    let utilisation = ctx.utilisation_percent;

    let is_above_max = bounds.max.is_some_and(|max| p > max);
    let is_below_min = bounds.min.is_some_and(|min| p < min);
    let is_above_threshold = when
        .utilisation_is_above_percent
        .is_some_and(|t| utilisation > t);
    let is_below_threshold = when
        .utilisation_is_below_percent
        .is_some_and(|t| utilisation < t);

    let (is_above_throttled_threshold, has_headroom, is_wanted_by_rule) = match ctx.direction {
        Direction::Increment => {
            let throttled = when
                .throttled_events_per_minute_is_above
                .is_some_and(|t| ctx.throttled > t);
            (
                throttled,
                bounds.max.is_none_or(|max| p < max),
                is_below_min || is_above_threshold || is_below_threshold || throttled,
            )
        }
        Direction::Decrement => (
            false,
            p > bounds.floor(),
            is_above_max || is_above_threshold || is_below_threshold,
        ),
    };
    let is_wanted = is_wanted_by_rule && has_headroom;

    let now_local = |t| local(t, now);
    let is_after_last_decrease_grace = grace_end(
        snapshot.provisioned.last_decrease.map(now_local),
        when.after_last_decrement_minutes,
    )
    .is_none_or(|end| now >= end);
    let is_after_last_increase_grace = grace_end(
        snapshot.provisioned.last_increase.map(now_local),
        when.after_last_increment_minutes,
    )
    .is_none_or(|end| now >= end);

    let candidate = calculator::compute(ctx);
    let is_decrement_allowed = match ctx.direction {
        Direction::Increment => true,
        Direction::Decrement => decrement::is_decrement_allowed(snapshot, ctx, candidate, now),
    };

    let is_allowed =
        is_after_last_decrease_grace && is_after_last_increase_grace && is_decrement_allowed;

    let decision = AdjustmentDecision {
        is_above_max,
        is_below_min,
        is_above_threshold,
        is_below_threshold,
        is_above_throttled_threshold,
        has_headroom,
        is_after_last_decrease_grace,
        is_after_last_increase_grace,
        is_decrement_allowed,
        is_wanted,
        is_allowed,
        candidate,
    };
    log_decision(ctx, &decision);
    Some(decision)
}

/// Whether the adjustment described by `ctx` should be applied now.
pub fn is_required(
    snapshot: &ThroughputSnapshot,
    ctx: &AdjustmentContext<'_>,
    now: DateTime<FixedOffset>,
) -> bool {
    evaluate(snapshot, ctx, now).is_some_and(|d| d.is_required())
}

fn log_decision(ctx: &AdjustmentContext<'_>, d: &AdjustmentDecision) {
    info!(
        resource = ctx.resource,
        index = ctx.index,
        capacity = %ctx.capacity,
        direction = %ctx.direction,
        provisioned = ctx.provisioned,
        consumed = ctx.consumed,
        utilisation_percent = ctx.utilisation_percent,
        throttled = ctx.throttled,
        is_above_max = d.is_above_max,
        is_below_min = d.is_below_min,
        is_above_threshold = d.is_above_threshold,
        is_below_threshold = d.is_below_threshold,
        is_above_throttled_threshold = d.is_above_throttled_threshold,
        has_headroom = d.has_headroom,
        is_after_last_decrease_grace = d.is_after_last_decrease_grace,
        is_after_last_increase_grace = d.is_after_last_increase_grace,
        is_decrement_allowed = d.is_decrement_allowed,
        is_wanted = d.is_wanted,
        is_allowed = d.is_allowed,
        candidate = d.candidate,
        "{}",
        describe(ctx, d)
    );
}

/// Human-readable account of a decision.
fn describe(ctx: &AdjustmentContext<'_>, d: &AdjustmentDecision) -> String {
    let mut msg = format!(
        "{} is consuming {:.2} of {} ({:.2}%) {} capacity units",
        ctx.display_name(),
        ctx.consumed,
        ctx.provisioned,
        ctx.utilisation_percent,
        ctx.capacity
    );

    let bounds = ctx.capacity_config;
    let when = ctx.adjustment.map(|a| &a.when);

    if let Some(max) = bounds.max
        && d.is_above_max
    {
        msg.push_str(&format!(" and is above max allowed {max} units"));
    }
    if let Some(t) = when.and_then(|w| w.utilisation_is_above_percent)
        && d.is_above_threshold
        && !d.is_above_max
    {
        msg.push_str(&format!(" and is above maximum threshold of {t}%"));
    }
    if let Some(min) = bounds.min
        && d.is_below_min
    {
        msg.push_str(&format!(" and is below the min allowed {min} units"));
    }
    if let Some(t) = when.and_then(|w| w.utilisation_is_below_percent)
        && d.is_below_threshold
        && !d.is_below_min
    {
        msg.push_str(&format!(" and is below minimum threshold of {t}%"));
    }
    if let Some(t) = when.and_then(|w| w.throttled_events_per_minute_is_above)
        && d.is_above_throttled_threshold
    {
        msg.push_str(&format!(" and throttled events per minute is above {t} events"));
    }

    let noun = match ctx.direction {
        Direction::Increment => "an increment",
        Direction::Decrement => "a decrement",
    };
    if !d.is_wanted {
        msg.push_str(&format!(" so {noun} is not required"));
    } else if d.is_allowed {
        msg.push_str(&format!(" so {noun} is WANTED and is ALLOWED"));
    } else if !d.is_after_last_decrease_grace {
        msg.push_str(&format!(
            " so {noun} is WANTED but is DISALLOWED due to \
             'after_last_decrement_minutes' grace period"
        ));
    } else if !d.is_after_last_increase_grace {
        msg.push_str(&format!(
            " so {noun} is WANTED but is DISALLOWED due to \
             'after_last_increment_minutes' grace period"
        ));
    } else {
        msg.push_str(&format!(" so {noun} is WANTED but is DISALLOWED by the decrement schedule"));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use capscale_core::{
        AdjustmentConfig, ByConfig, CapacityConfig, CapacityType, ConsumedThroughput,
        ProvisionedThroughput, ProvisionerConfig, ThrottledEvents, ToConfig, WhenConfig,
    };
    use chrono::Utc;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn noon() -> DateTime<FixedOffset> {
        at("2024-03-10T12:00:00+00:00")
    }

    fn snapshot(provisioned: u64, consumed: f64) -> ThroughputSnapshot {
        ThroughputSnapshot {
            resource: "orders".to_string(),
            index: None,
            provisioned: ProvisionedThroughput {
                read_units: provisioned,
                write_units: provisioned,
                ..Default::default()
            },
            consumed: ConsumedThroughput {
                read_units: consumed,
                write_units: consumed,
            },
            throttled: ThrottledEvents::default(),
        }
    }

    fn increment_policy() -> ProvisionerConfig {
        let mut policy = ProvisionerConfig::default();
        policy.read_capacity = CapacityConfig {
            min: Some(1),
            max: Some(10),
            increment: Some(AdjustmentConfig {
                when: WhenConfig {
                    utilisation_is_above_percent: Some(90.0),
                    ..Default::default()
                },
                by: Some(ByConfig {
                    units: Some(3),
                    ..Default::default()
                }),
                to: None,
            }),
            decrement: None,
        };
        policy
    }

    fn decrement_policy() -> ProvisionerConfig {
        let mut policy = ProvisionerConfig::default();
        policy.read_capacity = CapacityConfig {
            min: Some(1),
            max: None,
            increment: None,
            decrement: Some(AdjustmentConfig {
                when: WhenConfig {
                    utilisation_is_below_percent: Some(30.0),
                    ..Default::default()
                },
                by: None,
                to: Some(ToConfig {
                    consumed_percent: Some(100.0),
                    ..Default::default()
                }),
            }),
        };
        policy
    }

    fn decide(
        snap: &ThroughputSnapshot,
        policy: &ProvisionerConfig,
        direction: Direction,
        now: DateTime<FixedOffset>,
    ) -> Option<AdjustmentDecision> {
        let ctx = AdjustmentContext::new(snap, policy, CapacityType::Read, direction);
        evaluate(snap, &ctx, now)
    }

    #[test]
    fn full_utilisation_increments_by_units() {
        let snap = snapshot(5, 5.0);
        let d = decide(&snap, &increment_policy(), Direction::Increment, noon()).unwrap();

        assert!(d.is_above_threshold);
        assert!(d.is_required());
        assert_eq!(d.candidate, 8);
    }

    #[test]
    fn at_max_increment_is_not_wanted() {
        let snap = snapshot(10, 10.0);
        let d = decide(&snap, &increment_policy(), Direction::Increment, noon()).unwrap();

        assert!(d.is_above_threshold);
        assert!(!d.has_headroom);
        assert!(!d.is_wanted);
        assert!(!d.is_required());
    }

    #[test]
    fn low_utilisation_decrements_to_consumption() {
        let snap = snapshot(10, 1.0);
        let d = decide(&snap, &decrement_policy(), Direction::Decrement, noon()).unwrap();

        assert!(d.is_below_threshold);
        assert!(d.is_decrement_allowed);
        assert!(d.is_required());
        assert_eq!(d.candidate, 1);
    }

    #[test]
    fn spent_quota_blocks_decrement() {
        let mut snap = snapshot(10, 1.0);
        snap.provisioned.decreases_today = 4;
        let d = decide(&snap, &decrement_policy(), Direction::Decrement, noon()).unwrap();

        assert!(d.is_wanted);
        assert!(!d.is_decrement_allowed);
        assert!(!d.is_required());
    }

    #[test]
    fn decrement_at_floor_is_not_wanted() {
        let snap = snapshot(1, 0.0);
        let d = decide(&snap, &decrement_policy(), Direction::Decrement, noon()).unwrap();
        assert!(d.is_below_threshold);
        assert!(!d.is_wanted);
    }

    #[test]
    fn disabled_direction_short_circuits() {
        let mut snap = snapshot(10, 1.0);
        snap.provisioned.decreases_today = 0;
        let policy = increment_policy();
        assert!(decide(&snap, &policy, Direction::Decrement, noon()).is_none());

        let ctx = AdjustmentContext::new(&snap, &policy, CapacityType::Read, Direction::Decrement);
        assert!(!is_required(&snap, &ctx, noon()));
    }

    #[test]
    fn below_min_wants_increment_regardless_of_utilisation() {
        let mut policy = increment_policy();
        policy.read_capacity.min = Some(4);
        let snap = snapshot(2, 0.0);
        let d = decide(&snap, &policy, Direction::Increment, noon()).unwrap();

        assert!(d.is_below_min);
        assert!(d.is_required());
        assert_eq!(d.candidate, 4);
    }

    #[test]
    fn above_max_wants_decrement() {
        let mut policy = decrement_policy();
        policy.read_capacity.max = Some(8);
        let snap = snapshot(12, 11.0);
        let d = decide(&snap, &policy, Direction::Decrement, noon()).unwrap();

        assert!(d.is_above_max);
        assert!(!d.is_below_threshold);
        assert!(d.is_required());
        assert_eq!(d.candidate, 8);
    }

    #[test]
    fn throttling_triggers_increment() {
        let mut policy = increment_policy();
        if let Some(inc) = policy.read_capacity.increment.as_mut() {
            inc.when.throttled_events_per_minute_is_above = Some(0.0);
        }
        let mut snap = snapshot(5, 1.0);
        snap.throttled.read_per_minute = 2.0;
        let d = decide(&snap, &policy, Direction::Increment, noon()).unwrap();

        assert!(!d.is_above_threshold);
        assert!(d.is_above_throttled_threshold);
        assert!(d.is_required());
    }

    #[test]
    fn increment_grace_period_blocks_until_elapsed() {
        let mut policy = increment_policy();
        if let Some(inc) = policy.read_capacity.increment.as_mut() {
            inc.when.after_last_increment_minutes = Some(10);
        }
        let mut snap = snapshot(5, 5.0);
        snap.provisioned.last_increase = Some(at("2024-03-10T11:55:00+00:00").with_timezone(&Utc));

        let d = decide(&snap, &policy, Direction::Increment, noon()).unwrap();
        assert!(d.is_wanted);
        assert!(!d.is_after_last_increase_grace);
        assert!(!d.is_required());

        let later = at("2024-03-10T12:05:00+00:00");
        let d = decide(&snap, &policy, Direction::Increment, later).unwrap();
        assert!(d.is_after_last_increase_grace);
        assert!(d.is_required());
    }

    #[test]
    fn decrease_grace_period_applies_to_increments_too() {
        let mut policy = increment_policy();
        if let Some(inc) = policy.read_capacity.increment.as_mut() {
            inc.when.after_last_decrement_minutes = Some(30);
        }
        let mut snap = snapshot(5, 5.0);
        snap.provisioned.last_decrease = Some(at("2024-03-10T11:45:00+00:00").with_timezone(&Utc));

        let d = decide(&snap, &policy, Direction::Increment, noon()).unwrap();
        assert!(!d.is_after_last_decrease_grace);
        assert!(!d.is_required());
    }

    #[test]
    fn stable_snapshot_stays_not_required() {
        let snap = snapshot(10, 5.0);
        let policy = ProvisionerConfig::stock();

        for direction in [Direction::Increment, Direction::Decrement] {
            let ctx = AdjustmentContext::new(&snap, &policy, CapacityType::Read, direction);
            let first = is_required(&snap, &ctx, noon());
            let second = is_required(&snap, &ctx, noon());
            assert!(!first);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn description_explains_outcome() {
        let snap = snapshot(5, 5.0);
        let policy = increment_policy();
        let ctx = AdjustmentContext::new(&snap, &policy, CapacityType::Read, Direction::Increment);
        let d = evaluate(&snap, &ctx, noon()).unwrap();

        let msg = describe(&ctx, &d);
        assert!(msg.starts_with("orders is consuming 5.00 of 5 (100.00%) read capacity units"));
        assert!(msg.contains("above maximum threshold of 90%"));
        assert!(msg.ends_with("so an increment is WANTED and is ALLOWED"));
    }
}
