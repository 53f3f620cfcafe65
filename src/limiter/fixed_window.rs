//! Fixed window rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SluiceError};

use super::Limiter;

/// A rate limiter that counts requests against a fixed-size time window.
///
/// The window is anchored to the first request after the previous window
/// expired, not to wall-clock boundaries, so two limiters created at
/// different times roll over at different instants. Bursting across a
/// window edge is an inherent property of this algorithm.
pub struct FixedWindowLimiter {
    /// Maximum requests admitted per window
    limit: u64,
    /// Window length
    window: Duration,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Counter and rollover state, serialized across callers
    state: Mutex<WindowState>,
}

struct WindowState {
    /// Requests admitted in the current window
    counter: u64,
    /// When the current window began
    window_start: Instant,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting at most `limit` requests per `window`.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected time source.
    pub fn with_clock(limit: u64, window: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if limit == 0 {
            return Err(SluiceError::Config("limit must be greater than 0".into()));
        }
        if window.is_zero() {
            return Err(SluiceError::Config("window must be greater than 0".into()));
        }

        let window_start = clock.now();
        Ok(Self {
            limit,
            window,
            clock,
            state: Mutex::new(WindowState {
                counter: 0,
                window_start,
            }),
        })
    }
}

impl Limiter for FixedWindowLimiter {
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();

        // Lazy rollover: there is no background timer, the first caller
        // past the window edge resets the counter.
        let now = self.clock.now();
        if now.duration_since(state.window_start) > self.window {
            state.counter = 0;
            state.window_start = now;
        }

        if state.counter < self.limit {
            state.counter += 1;
            return true;
        }

        debug!(limit = self.limit, window = ?self.window, "fixed window limit reached");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_zero_limit_fails_construction() {
        assert!(FixedWindowLimiter::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_zero_window_fails_construction() {
        assert!(FixedWindowLimiter::new(10, Duration::ZERO).is_err());
    }

    #[test]
    fn test_admits_up_to_limit() {
        let clock = ManualClock::new();
        let limiter =
            FixedWindowLimiter::with_clock(2, Duration::from_secs(1), Arc::new(clock)).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_rollover_resets_counter() {
        let clock = ManualClock::new();
        let limiter =
            FixedWindowLimiter::with_clock(2, Duration::from_secs(1), Arc::new(clock.clone()))
                .unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_millis(1100));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_window_not_expired_at_exact_boundary() {
        let clock = ManualClock::new();
        let limiter =
            FixedWindowLimiter::with_clock(1, Duration::from_secs(1), Arc::new(clock.clone()))
                .unwrap();

        assert!(limiter.try_acquire());

        // Rollover requires elapsed strictly greater than the window.
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_nanos(1));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_rejection_leaves_counter_untouched() {
        let clock = ManualClock::new();
        let limiter =
            FixedWindowLimiter::with_clock(1, Duration::from_secs(1), Arc::new(clock.clone()))
                .unwrap();

        assert!(limiter.try_acquire());
        for _ in 0..10 {
            assert!(!limiter.try_acquire());
        }

        // The rejected calls must not have disturbed the window state.
        clock.advance(Duration::from_millis(1001));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
