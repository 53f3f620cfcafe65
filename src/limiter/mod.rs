//! Admission-control strategies.
//!
//! Five interchangeable algorithms behind one [`Limiter`] contract, so the
//! dispatch code calling them stays strategy-agnostic.

mod fixed_window;
mod leaky_bucket;
mod sliding_log;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_log::{SlidingLogLimiter, Strategy};
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Trait for admission-control strategies.
///
/// This trait abstracts over the concrete rate-limiting algorithms so
/// callers can hold any of them behind one object-safe contract.
pub trait Limiter: Send + Sync {
    /// Try to admit one unit of work right now.
    ///
    /// Returns `true` if the work may proceed. Rejection is immediate and
    /// never blocks; the caller decides whether to retry, queue, or drop.
    fn try_acquire(&self) -> bool;
}
