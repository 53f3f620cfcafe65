//! Token bucket rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SluiceError};

use super::Limiter;

/// A rate limiter backed by a continuously replenished token balance.
///
/// Tokens are minted at `rate` per whole elapsed second and capped at
/// `capacity`. The bucket starts empty, modeling a cold start: nothing is
/// admitted until at least one second has passed.
pub struct TokenBucketLimiter {
    /// Maximum tokens the bucket can hold
    capacity: u64,
    /// Tokens minted per whole elapsed second
    rate: u64,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Balance and refill state, serialized across callers
    state: Mutex<BucketState>,
}

struct BucketState {
    /// Tokens currently available
    tokens: u64,
    /// When tokens were last minted
    last_refill: Instant,
}

impl TokenBucketLimiter {
    /// Create a bucket holding at most `capacity` tokens, refilled at
    /// `rate` tokens per second.
    pub fn new(capacity: u64, rate: u64) -> Result<Self> {
        Self::with_clock(capacity, rate, Arc::new(SystemClock))
    }

    /// Create a bucket with an injected time source.
    pub fn with_clock(capacity: u64, rate: u64, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(SluiceError::Config(
                "capacity must be greater than 0".into(),
            ));
        }
        if rate == 0 {
            return Err(SluiceError::Config("rate must be greater than 0".into()));
        }

        let last_refill = clock.now();
        Ok(Self {
            capacity,
            rate,
            clock,
            state: Mutex::new(BucketState {
                tokens: 0,
                last_refill,
            }),
        })
    }
}

impl Limiter for TokenBucketLimiter {
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();

        let now = self.clock.now();
        let whole_secs = now.duration_since(state.last_refill).as_secs();
        if whole_secs >= 1 {
            let minted = whole_secs.saturating_mul(self.rate);
            state.tokens = self.capacity.min(state.tokens.saturating_add(minted));
            // Advance by whole seconds only; the fractional remainder
            // keeps accruing toward the next refill.
            state.last_refill += Duration::from_secs(whole_secs);
        }

        if state.tokens == 0 {
            debug!(capacity = self.capacity, rate = self.rate, "token bucket empty");
            return false;
        }

        state.tokens -= 1;
        true
    }
}
