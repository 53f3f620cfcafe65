//! Sliding window rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SluiceError};

use super::Limiter;

/// A rate limiter that evaluates a continuously sliding trailing interval.
///
/// The nominal window is subdivided into small buckets keyed by their start
/// offset; the admission decision sums counts over the trailing buckets
/// covering the window. This avoids the fixed window's edge-burst problem
/// at the cost of `window / small_window` buckets of memory. Expired
/// buckets are purged lazily on the next acquire, never by a timer.
pub struct SlidingWindowLimiter {
    /// Maximum requests admitted within the trailing window
    limit: u64,
    /// Nominal window length in nanoseconds
    window_ns: u64,
    /// Bucket granularity in nanoseconds
    small_window_ns: u64,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Origin all bucket keys are measured from
    origin: Instant,
    /// Admission counts keyed by bucket start offset, always an exact
    /// multiple of the small window
    buckets: Mutex<HashMap<u64, u64>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting at most `limit` requests per trailing
    /// `window`, tracked at `small_window` granularity.
    pub fn new(limit: u64, window: Duration, small_window: Duration) -> Result<Self> {
        Self::with_clock(limit, window, small_window, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected time source.
    pub fn with_clock(
        limit: u64,
        window: Duration,
        small_window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(SluiceError::Config("limit must be greater than 0".into()));
        }
        if window.is_zero() || small_window.is_zero() {
            return Err(SluiceError::Config(
                "window and small window must be greater than 0".into(),
            ));
        }
        let window_ns = window.as_nanos() as u64;
        let small_window_ns = small_window.as_nanos() as u64;
        if window_ns % small_window_ns != 0 {
            return Err(SluiceError::Config(format!(
                "window {:?} must be an exact multiple of the small window {:?}",
                window, small_window
            )));
        }

        let origin = clock.now();
        Ok(Self {
            limit,
            window_ns,
            small_window_ns,
            clock,
            origin,
            buckets: Mutex::new(HashMap::new()),
        })
    }
}

impl Limiter for SlidingWindowLimiter {
    fn try_acquire(&self) -> bool {
        let mut buckets = self.buckets.lock();

        let now = self.clock.now();
        let now_ns = now.duration_since(self.origin).as_nanos() as u64;
        let current = now_ns / self.small_window_ns * self.small_window_ns;

        // Purge buckets that have slid out of the trailing window, then
        // sum what remains.
        let window_start = current.saturating_sub(self.window_ns);
        buckets.retain(|&start, _| start >= window_start);
        let total: u64 = buckets.values().sum();

        if total < self.limit {
            *buckets.entry(current).or_insert(0) += 1;
            return true;
        }

        debug!(
            limit = self.limit,
            window_ns = self.window_ns,
            "sliding window limit reached"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_indivisible_window_fails_construction() {
        let result =
            SlidingWindowLimiter::new(10, Duration::from_secs(1), Duration::from_millis(300));
        assert!(matches!(result, Err(SluiceError::Config(_))));
    }

    #[test]
    fn test_zero_limit_fails_construction() {
        assert!(
            SlidingWindowLimiter::new(0, Duration::from_secs(1), Duration::from_millis(100))
                .is_err()
        );
    }

    #[test]
    fn test_admits_across_sub_buckets_up_to_limit() {
        let clock = ManualClock::new();
        let limiter = SlidingWindowLimiter::with_clock(
            3,
            Duration::from_secs(1),
            Duration::from_millis(100),
            Arc::new(clock.clone()),
        )
        .unwrap();

        assert!(limiter.try_acquire());
        clock.advance(Duration::from_millis(100));
        assert!(limiter.try_acquire());
        clock.advance(Duration::from_millis(100));
        assert!(limiter.try_acquire());

        clock.advance(Duration::from_millis(50));
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_count_decays_as_window_slides() {
        let clock = ManualClock::new();
        let limiter = SlidingWindowLimiter::with_clock(
            3,
            Duration::from_secs(1),
            Duration::from_millis(100),
            Arc::new(clock.clone()),
        )
        .unwrap();

        // Buckets at 0ms, 100ms, 200ms.
        assert!(limiter.try_acquire());
        clock.advance(Duration::from_millis(100));
        assert!(limiter.try_acquire());
        clock.advance(Duration::from_millis(100));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // At 1.15s the 0ms bucket has slid out; one slot opens and the
        // count never jumps back up.
        clock.advance(Duration::from_millis(950));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // At 1.25s the 100ms bucket expires as well.
        clock.advance(Duration::from_millis(100));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_full_window_elapsed_clears_all_buckets() {
        let clock = ManualClock::new();
        let limiter = SlidingWindowLimiter::with_clock(
            2,
            Duration::from_secs(1),
            Duration::from_millis(100),
            Arc::new(clock.clone()),
        )
        .unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_millis(1200));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_rejection_leaves_buckets_untouched() {
        let clock = ManualClock::new();
        let limiter = SlidingWindowLimiter::with_clock(
            2,
            Duration::from_secs(1),
            Duration::from_millis(100),
            Arc::new(clock.clone()),
        )
        .unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        for _ in 0..10 {
            assert!(!limiter.try_acquire());
        }

        clock.advance(Duration::from_millis(1200));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
