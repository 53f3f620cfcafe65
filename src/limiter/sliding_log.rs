//! Tiered sliding log rate limiting.
//!
//! Enforces several sliding-window strategies at once against one shared
//! bucket map, so a constraint like "5 per second and 100 per minute" is a
//! single atomic decision with no race window between separately-locked
//! limiters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SluiceError};

use super::Limiter;

/// One limit/window pair enforced by a [`SlidingLogLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    /// Maximum requests within the window
    pub limit: u64,
    /// Window length
    pub window: Duration,
}

impl Strategy {
    /// Create a strategy admitting at most `limit` requests per `window`.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// A validated strategy with its window expressed in small-window units.
struct Tier {
    limit: u64,
    window_ns: u64,
    /// Number of small windows covering this tier's window
    small_windows: u64,
}

/// A rate limiter enforcing several sliding-window strategies together.
///
/// All tiers share one small-bucket counter map, so one log of counts
/// serves every constraint without double bookkeeping. Construction orders
/// strategies by window size descending and rejects configurations where a
/// strictly smaller window does not carry a strictly smaller limit: a burst
/// constraint must be tighter than the sustained constraint it nests in.
pub struct SlidingLogLimiter {
    /// Tiers ordered by window size descending
    tiers: Vec<Tier>,
    /// Shared bucket granularity in nanoseconds
    small_window_ns: u64,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Origin all bucket keys are measured from
    origin: Instant,
    /// Admission counts keyed by bucket start offset
    counters: Mutex<HashMap<u64, u64>>,
}

impl SlidingLogLimiter {
    /// Create a tiered limiter over the given strategies, tracked at
    /// `small_window` granularity.
    pub fn new(small_window: Duration, strategies: Vec<Strategy>) -> Result<Self> {
        Self::with_clock(small_window, strategies, Arc::new(SystemClock))
    }

    /// Create a tiered limiter with an injected time source.
    pub fn with_clock(
        small_window: Duration,
        strategies: Vec<Strategy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if small_window.is_zero() {
            return Err(SluiceError::Config(
                "small window must be greater than 0".into(),
            ));
        }
        if strategies.is_empty() {
            return Err(SluiceError::Config(
                "at least one strategy is required".into(),
            ));
        }
        let small_window_ns = small_window.as_nanos() as u64;

        // Largest window first; equal windows keep the larger limit first.
        let mut ordered = strategies;
        ordered.sort_by(|a, b| b.window.cmp(&a.window).then(b.limit.cmp(&a.limit)));

        let mut tiers = Vec::with_capacity(ordered.len());
        for (i, strategy) in ordered.iter().enumerate() {
            if strategy.limit == 0 {
                return Err(SluiceError::Config(
                    "strategy limit must be greater than 0".into(),
                ));
            }
            if i > 0 && strategy.limit >= ordered[i - 1].limit {
                return Err(SluiceError::Config(format!(
                    "strategy {} per {:?} must have a smaller limit than the wider strategy {} per {:?}",
                    strategy.limit,
                    strategy.window,
                    ordered[i - 1].limit,
                    ordered[i - 1].window
                )));
            }
            let window_ns = strategy.window.as_nanos() as u64;
            if window_ns == 0 {
                return Err(SluiceError::Config(
                    "strategy window must be greater than 0".into(),
                ));
            }
            if window_ns % small_window_ns != 0 {
                return Err(SluiceError::Config(format!(
                    "strategy window {:?} must be an exact multiple of the small window {:?}",
                    strategy.window, small_window
                )));
            }
            tiers.push(Tier {
                limit: strategy.limit,
                window_ns,
                small_windows: window_ns / small_window_ns,
            });
        }

        let origin = clock.now();
        Ok(Self {
            tiers,
            small_window_ns,
            clock,
            origin,
            counters: Mutex::new(HashMap::new()),
        })
    }

    /// Try to admit one unit of work against every tier at once.
    ///
    /// On rejection the error names the violated tier's limit and window,
    /// and no counter is touched.
    pub fn try_acquire(&self) -> Result<()> {
        let mut counters = self.counters.lock();

        let now = self.clock.now();
        let now_ns = now.duration_since(self.origin).as_nanos() as u64;
        let current = now_ns / self.small_window_ns * self.small_window_ns;

        // Trailing-window start per tier. Tiers are ordered widest first,
        // so starts[0] is the oldest bucket any tier still cares about.
        let starts: Vec<u64> = self
            .tiers
            .iter()
            .map(|tier| {
                current.saturating_sub(self.small_window_ns.saturating_mul(tier.small_windows - 1))
            })
            .collect();

        // One pass over the log: purge buckets no tier can see anymore and
        // accumulate each tier's count from the buckets inside its own
        // trailing window.
        let mut counts = vec![0u64; self.tiers.len()];
        counters.retain(|&bucket, count| {
            if bucket < starts[0] {
                return false;
            }
            for (i, &start) in starts.iter().enumerate() {
                if bucket >= start {
                    counts[i] += *count;
                }
            }
            true
        });

        for (tier, &count) in self.tiers.iter().zip(counts.iter()) {
            if count >= tier.limit {
                debug!(
                    limit = tier.limit,
                    window_ns = tier.window_ns,
                    "sliding log tier exhausted"
                );
                return Err(SluiceError::StrategyViolation {
                    limit: tier.limit,
                    window: Duration::from_nanos(tier.window_ns),
                });
            }
        }

        *counters.entry(current).or_insert(0) += 1;
        Ok(())
    }
}

impl Limiter for SlidingLogLimiter {
    fn try_acquire(&self) -> bool {
        SlidingLogLimiter::try_acquire(self).is_ok()
    }
}
