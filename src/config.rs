//! Declarative limiter configuration.
//!
//! Maps named resources to admission strategies so a hosting process can
//! build its limiters from a YAML document instead of code. Windows are
//! expressed in milliseconds.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SluiceError};
use crate::limiter::{
    FixedWindowLimiter, LeakyBucketLimiter, Limiter, SlidingLogLimiter, SlidingWindowLimiter,
    Strategy, TokenBucketLimiter,
};

/// A set of named limiter configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Map of resource name to its limiter configuration
    #[serde(default)]
    pub resources: HashMap<String, LimiterConfig>,
}

/// Configuration for a single limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// Single counter reset on window rollover
    FixedWindow { limit: u64, window_ms: u64 },
    /// Continuously replenished token balance, capped at capacity
    TokenBucket {
        capacity: u64,
        /// Tokens minted per whole elapsed second
        rate: u64,
    },
    /// Water level draining at a constant rate, filled by admissions
    LeakyBucket {
        peak_level: u64,
        /// Units drained per second
        drain_rate: u64,
    },
    /// Trailing window summed over small buckets
    SlidingWindow {
        limit: u64,
        window_ms: u64,
        small_window_ms: u64,
    },
    /// Several limit/window pairs enforced together
    SlidingLog {
        small_window_ms: u64,
        strategies: Vec<StrategyConfig>,
    },
}

/// One tier of a sliding log limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub limit: u64,
    pub window_ms: u64,
}

impl AdmissionConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SluiceError::Config(format!("failed to parse admission config: {}", e)))
    }

    /// Build the limiter configured for `resource`, if one is present.
    pub fn build(&self, resource: &str) -> Option<Result<Box<dyn Limiter>>> {
        self.resources.get(resource).map(LimiterConfig::build)
    }

    /// Build every configured limiter, keyed by resource name.
    pub fn build_all(&self) -> Result<HashMap<String, Box<dyn Limiter>>> {
        self.resources
            .iter()
            .map(|(name, config)| Ok((name.clone(), config.build()?)))
            .collect()
    }
}

impl LimiterConfig {
    /// Construct the limiter this configuration describes.
    ///
    /// Invalid parameters surface as [`SluiceError::Config`] from the
    /// underlying constructor.
    pub fn build(&self) -> Result<Box<dyn Limiter>> {
        match self {
            LimiterConfig::FixedWindow { limit, window_ms } => Ok(Box::new(
                FixedWindowLimiter::new(*limit, Duration::from_millis(*window_ms))?,
            )),
            LimiterConfig::TokenBucket { capacity, rate } => {
                Ok(Box::new(TokenBucketLimiter::new(*capacity, *rate)?))
            }
            LimiterConfig::LeakyBucket {
                peak_level,
                drain_rate,
            } => Ok(Box::new(LeakyBucketLimiter::new(*peak_level, *drain_rate)?)),
            LimiterConfig::SlidingWindow {
                limit,
                window_ms,
                small_window_ms,
            } => Ok(Box::new(SlidingWindowLimiter::new(
                *limit,
                Duration::from_millis(*window_ms),
                Duration::from_millis(*small_window_ms),
            )?)),
            LimiterConfig::SlidingLog {
                small_window_ms,
                strategies,
            } => {
                let strategies = strategies
                    .iter()
                    .map(|s| Strategy::new(s.limit, Duration::from_millis(s.window_ms)))
                    .collect();
                Ok(Box::new(SlidingLogLimiter::new(
                    Duration::from_millis(*small_window_ms),
                    strategies,
                )?))
            }
        }
    }
}
