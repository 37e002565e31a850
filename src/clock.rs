//! A single clock abstraction so day-rollover, freeze-window, and rescan
//! timing are all testable without sleeping or depending on a hidden global.
//!
//! Every time read in the archive and stalker subsystems goes through a
//! `Clock`, injected at construction rather than read from a singleton.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Anything that can report "now" as microseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> i64;

    fn now_unix_secs(&self) -> i64 {
        self.now_us().div_euclid(1_000_000)
    }
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> i64 {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        d.as_micros() as i64
    }
}

/// A clock whose value is set explicitly — for deterministic tests.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_us: i64) -> Self {
        Self(AtomicI64::new(now_us))
    }

    pub fn set(&self, now_us: i64) {
        self.0.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: i64) {
        self.0.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_us(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub const US_PER_DAY: i64 = 86_400_000_000;

/// Split microseconds-since-epoch into `(day_number, time_us_within_day)`.
pub fn floor_days(now_us: i64) -> (i64, u64) {
    let day = now_us.div_euclid(US_PER_DAY);
    let time_us = now_us.rem_euclid(US_PER_DAY) as u64;
    (day, time_us)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_days_splits_correctly() {
        // 2024-01-15T12:00:00.25Z
        let day_number = crate::model::Ymd::new(2024, 1, 15).day_number();
        let now_us = day_number * US_PER_DAY + 43_200_250_000;
        let (day, time_us) = floor_days(now_us);
        assert_eq!(day, day_number);
        assert_eq!(time_us, 43_200_250_000);
    }

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = FixedClock::new(1000);
        assert_eq!(clock.now_us(), 1000);
        clock.advance(500);
        assert_eq!(clock.now_us(), 1500);
    }
}
