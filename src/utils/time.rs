//! Time and clock utilities

use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

const MILLIS_PER_DAY: u128 = 1000 * 60 * 60 * 24;

/// Source of "now" for file naming and scheduling decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, used to exercise date changes without waiting
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the given Unix timestamp (milliseconds)
    pub fn at_millis(millis: i64) -> Self {
        Self::new(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Age of `then` relative to `now`, in whole elapsed days
///
/// Timestamps in the future count as zero days old.
pub fn whole_days_between(then: SystemTime, now: SystemTime) -> u64 {
    match now.duration_since(then) {
        Ok(age) => (age.as_millis() / MILLIS_PER_DAY) as u64,
        Err(_) => 0,
    }
}

/// Convert a positive epoch-millis value into a UTC timestamp
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
