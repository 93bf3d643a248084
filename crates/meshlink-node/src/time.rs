//! Time source for the protocol stack.
//!
//! Retry timers and neighbor ages are computed from a caller-supplied [`Clock`]
//! rather than the wall clock, so tests can step time deterministically with a
//! [`ManualClock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A point in time, in microseconds since the clock's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock's origin.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        Timestamp(us)
    }

    /// Create a timestamp from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms * 1_000)
    }

    /// Create a timestamp from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1_000_000)
    }

    /// Microseconds since the origin.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Seconds since the origin.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// `self + duration`, or `None` on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Timestamp> {
        let us = u64::try_from(duration.as_micros()).ok()?;
        self.0.checked_add(us).map(Timestamp)
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        self.checked_add(rhs).unwrap_or(Timestamp(u64::MAX))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Source of the current time.
pub trait Clock {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Monotonic wall-clock time measured from construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let us = u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX);
        Timestamp(us)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the stack
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let us = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        self.now_us.store(to.as_micros(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_us.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t0 = Timestamp::from_secs(2);
        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(t1, Timestamp::from_millis(3500));
        assert_eq!(t1.saturating_duration_since(t0), Duration::from_millis(1500));
        assert_eq!(t0.saturating_duration_since(t1), Duration::ZERO);
        assert_eq!(t1.to_string(), "3.500s");
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        assert_eq!(clock.now(), Timestamp::ZERO);

        handle.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), Timestamp::from_secs(3));

        handle.set(Timestamp::from_secs(10));
        assert_eq!(clock.now(), Timestamp::from_secs(10));
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
