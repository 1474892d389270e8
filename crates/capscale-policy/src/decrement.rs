//! Decrement scheduling.
//!
//! The control plane allows only [`DAILY_DECREMENT_QUOTA`] decreases per
//! local day. Rather than spending them as soon as utilisation dips, the
//! remaining quota is spread across the rest of the day: the span from the
//! last decrease (or midnight) to 23:30 is cut into `quota + 1 - used`
//! equal slices and the next decrease waits for the end of the first one.
//! Grace periods after the last increase/decrease push that moment later.

use chrono::{DateTime, FixedOffset, TimeDelta};

use capscale_core::{DAILY_DECREMENT_QUOTA, ThroughputSnapshot};

use crate::clock::{last_decrement_cutoff, local, start_of_day, start_of_tomorrow};
use crate::context::AdjustmentContext;

/// Earliest moment the next decrement of `snapshot` may happen.
pub fn next_allowed_decrement(
    snapshot: &ThroughputSnapshot,
    ctx: &AdjustmentContext<'_>,
    now: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    let provisioned = &snapshot.provisioned;
    if provisioned.decreases_today >= DAILY_DECREMENT_QUOTA {
        return start_of_tomorrow(now);
    }

    let last_decrease = provisioned.last_decrease.map(|t| local(t, now));
    let anchor = last_decrease.map_or(start_of_day(now), |t| t.max(start_of_day(now)));
    let slices = (DAILY_DECREMENT_QUOTA + 1 - provisioned.decreases_today) as i32;
    let slice = (last_decrement_cutoff(now) - anchor) / slices;
    let mut next = anchor + slice;

    if let Some(when) = ctx.adjustment.map(|a| &a.when) {
        let last_increase = provisioned.last_increase.map(|t| local(t, now));
        if let Some(grace) = grace_end(last_increase, when.after_last_increment_minutes) {
            next = next.max(grace);
        }
        if let Some(grace) = grace_end(last_decrease, when.after_last_decrement_minutes) {
            next = next.max(grace);
        }
    }
    next
}

/// Whether a decrement to `candidate` may be applied at `now`.
///
/// `candidate` is the value the calculator produced for `ctx`; it is only
/// used to size the change. Small changes are held back until the last
/// window of the day so they do not burn a scarce decrease.
pub fn is_decrement_allowed(
    snapshot: &ThroughputSnapshot,
    ctx: &AdjustmentContext<'_>,
    candidate: u64,
    now: DateTime<FixedOffset>,
) -> bool {
    if now < next_allowed_decrement(snapshot, ctx, now) {
        return false;
    }

    let magnitude = ctx.provisioned.abs_diff(candidate);
    let threshold = ctx.adjustment.and_then(|a| a.when.unit_adjustment_greater_than);
    if let Some(threshold) = threshold
        && magnitude <= threshold
        && now < last_decrement_cutoff(now)
    {
        return false;
    }

    true
}

/// End of a grace period, or `None` when there is no history or no period.
pub(crate) fn grace_end(
    last: Option<DateTime<FixedOffset>>,
    minutes: Option<u32>,
) -> Option<DateTime<FixedOffset>> {
    Some(last? + TimeDelta::minutes(i64::from(minutes?)))
}
