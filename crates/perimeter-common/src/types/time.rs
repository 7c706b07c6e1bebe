//! Time source
//!
//! All time comparisons use an externally supplied "current time" in unix
//! seconds. The core never reads the wall clock itself; callers pass `now`
//! explicitly, typically from a [`Clock`].

use std::sync::atomic::{AtomicI64, Ordering};

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Seconds in one day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Convert a day count to seconds
#[inline]
pub fn days(n: u32) -> i64 {
    i64::from(n) * SECONDS_PER_DAY
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven, monotonic clock for simulations and tests
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Start from the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    /// Move the clock forward by `seconds` (negative values are ignored)
    pub fn advance(&self, seconds: i64) -> Timestamp {
        let step = seconds.max(0);
        self.now.fetch_add(step, Ordering::SeqCst) + step
    }

    pub fn advance_days(&self, n: u32) -> Timestamp {
        self.advance(days(n))
    }

    /// Jump to `target` if it is not in the past
    pub fn set(&self, target: Timestamp) -> Timestamp {
        self.now.fetch_max(target, Ordering::SeqCst).max(target)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.advance(50), 1_050);
        assert_eq!(clock.advance(-10), 1_050);
        assert_eq!(clock.set(900), 1_050);
        assert_eq!(clock.now(), 1_050);
        assert_eq!(clock.set(2_000), 2_000);
        assert_eq!(clock.advance_days(1), 2_000 + SECONDS_PER_DAY);
    }
}
