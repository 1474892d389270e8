//! Adjusted-value calculation.
//!
//! Every configured `by`/`to` strategy produces a candidate; increments
//! take the largest, decrements the smallest. Unconfigured strategies
//! propose the current value, so they never win unless nothing is set.
//!
//! ```text
//! by.provisioned_percent   P + d·P·pct/100
//! by.consumed_percent      P + d·C·pct/100
//! by.units                 P + d·units
//!   (+ throttled·multiplier on every `by` candidate, increments only)
//! to.provisioned_percent   P·pct/100
//! to.consumed_percent      C·pct/100
//! to.units                 units
//! ```

use capscale_core::Direction;

use crate::context::AdjustmentContext;

/// New capacity value for `ctx`.
///
/// A provisioned value outside `[min, max]` snaps straight to the violated
/// bound. Otherwise the most aggressive candidate is rounded and clamped to
/// `[max(min, 1), max]`.
pub fn compute(ctx: &AdjustmentContext<'_>) -> u64 {
    let bounds = ctx.capacity_config;
    if let Some(min) = bounds.min
        && ctx.provisioned < min
    {
        return min;
    }
    if let Some(max) = bounds.max
        && ctx.provisioned > max
    {
        return max;
    }

    let Some(adjustment) = ctx.adjustment else {
        return ctx.provisioned;
    };

    let p = ctx.provisioned as f64;
    let c = ctx.consumed;
    let sign = ctx.direction.sign();
    let by = adjustment.by.as_ref();
    let to = adjustment.to.as_ref();

    let multiplier = by.and_then(|b| b.throttled_events_with_multiplier);
    let throttle_bonus = match (ctx.direction, multiplier) {
        (Direction::Increment, Some(multiplier)) => ctx.throttled * multiplier,
        _ => 0.0,
    };

    let candidates = [
        by.and_then(|b| b.provisioned_percent)
            .map_or(p, |pct| p + sign * p * pct / 100.0)
            + throttle_bonus,
        by.and_then(|b| b.consumed_percent)
            .map_or(p, |pct| p + sign * c * pct / 100.0)
            + throttle_bonus,
        by.and_then(|b| b.units)
            .map_or(p, |units| p + sign * units as f64)
            + throttle_bonus,
        to.and_then(|t| t.provisioned_percent)
            .map_or(p, |pct| p * pct / 100.0),
        to.and_then(|t| t.consumed_percent)
            .map_or(p, |pct| c * pct / 100.0),
        to.and_then(|t| t.units).map_or(p, |units| units as f64),
    ];

    let selected = match ctx.direction {
        Direction::Increment => candidates.into_iter().fold(f64::NEG_INFINITY, f64::max),
        Direction::Decrement => candidates.into_iter().fold(f64::INFINITY, f64::min),
    };

    let mut value = selected.round().max(0.0) as u64;
    if let Some(max) = bounds.max {
        value = value.min(max);
    }
    value.max(bounds.floor())
}
