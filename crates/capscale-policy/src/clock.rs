//! Wall-clock access and local-day arithmetic.
//!
//! Decrement scheduling works on the local calendar day, so `now` carries
//! its UTC offset. Tests pin time with [`FixedClock`].

use chrono::{DateTime, FixedOffset, Local, NaiveTime, TimeDelta, Utc};

/// Minutes past midnight of the last decrement window of the day (23:30).
const LAST_DECREMENT_MINUTE: i64 = 23 * 60 + 30;

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The host's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Local midnight at the start of `now`'s day.
pub fn start_of_day(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now - now.time().signed_duration_since(NaiveTime::MIN)
}

/// Local midnight at the start of the next day.
pub fn start_of_tomorrow(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    start_of_day(now) + TimeDelta::days(1)
}

/// 23:30 local on `now`'s day; the last moment a decrement is scheduled.
pub fn last_decrement_cutoff(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    start_of_day(now) + TimeDelta::minutes(LAST_DECREMENT_MINUTE)
}

/// Express a stored UTC timestamp in `now`'s offset.
pub fn local(at: DateTime<Utc>, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at.with_timezone(now.offset())
}
