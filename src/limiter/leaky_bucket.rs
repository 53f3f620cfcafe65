//! Leaky bucket rate limiting.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SluiceError};

use super::Limiter;

/// A rate limiter modeling bounded, constant-rate service capacity.
///
/// Each admitted request raises the water level by one unit; the level
/// drains at `drain_rate` units per second. Requests are admitted while the
/// level is below `peak_level`. Unlike a quota that resets, the bucket
/// drains continuously, smoothing admissions to the drain rate.
pub struct LeakyBucketLimiter {
    /// Highest water level the bucket can reach
    peak_level: u64,
    /// Units drained per whole elapsed second
    drain_rate: u64,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Water level and drain state, serialized across callers
    state: Mutex<LevelState>,
}

struct LevelState {
    /// Current water level
    level: u64,
    /// When the bucket last drained
    last_drain: Instant,
}

impl LeakyBucketLimiter {
    /// Create a bucket with the given peak level, draining `drain_rate`
    /// units per second.
    pub fn new(peak_level: u64, drain_rate: u64) -> Result<Self> {
        Self::with_clock(peak_level, drain_rate, Arc::new(SystemClock))
    }

    /// Create a bucket with an injected time source.
    pub fn with_clock(peak_level: u64, drain_rate: u64, clock: Arc<dyn Clock>) -> Result<Self> {
        if drain_rate == 0 {
            return Err(SluiceError::Config(
                "drain rate must be greater than 0".into(),
            ));
        }
        if peak_level < drain_rate {
            return Err(SluiceError::Config(
                "peak level must be greater than or equal to the drain rate".into(),
            ));
        }

        let last_drain = clock.now();
        Ok(Self {
            peak_level,
            drain_rate,
            clock,
            state: Mutex::new(LevelState {
                level: 0,
                last_drain,
            }),
        })
    }
}

impl Limiter for LeakyBucketLimiter {
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();

        // Lazy drain, in the same spirit as the fixed window's lazy
        // rollover: the level only moves when a caller shows up.
        let now = self.clock.now();
        let whole_secs = now.duration_since(state.last_drain).as_secs();
        if whole_secs >= 1 {
            let drained = whole_secs.saturating_mul(self.drain_rate);
            state.level = state.level.saturating_sub(drained);
            state.last_drain = now;
        }

        if state.level < self.peak_level {
            state.level += 1;
            return true;
        }

        debug!(
            peak_level = self.peak_level,
            drain_rate = self.drain_rate,
            "leaky bucket full"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_zero_drain_rate_fails_construction() {
        assert!(LeakyBucketLimiter::new(10, 0).is_err());
    }

    #[test]
    fn test_peak_below_drain_rate_fails_construction() {
        assert!(LeakyBucketLimiter::new(3, 5).is_err());
    }

    #[test]
    fn test_admits_until_peak_level() {
        let clock = ManualClock::new();
        let limiter = LeakyBucketLimiter::with_clock(3, 1, Arc::new(clock)).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_drain_frees_capacity() {
        let clock = ManualClock::new();
        let limiter = LeakyBucketLimiter::with_clock(3, 1, Arc::new(clock.clone())).unwrap();

        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // One second drains one unit, making room for exactly one request.
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_level_floors_at_zero() {
        let clock = ManualClock::new();
        let limiter = LeakyBucketLimiter::with_clock(5, 5, Arc::new(clock.clone())).unwrap();

        assert!(limiter.try_acquire());

        // Far more drain than fill; the level must not wrap below zero.
        clock.advance(Duration::from_secs(3600));
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_rejection_leaves_level_untouched() {
        let clock = ManualClock::new();
        let limiter = LeakyBucketLimiter::with_clock(2, 1, Arc::new(clock.clone())).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        for _ in 0..10 {
            assert!(!limiter.try_acquire());
        }

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
