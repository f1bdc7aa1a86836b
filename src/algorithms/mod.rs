//! Rate limiting algorithms module
//!
//! Each algorithm is a plain state machine. None of them is shared: a
//! [`Limiter`](crate::rate_limiter::Limiter) moves the state into its own task
//! and every decision is made there.

pub mod fixed_window;
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

use crate::error::LimiterError;
use crate::rate_limiter::{Limiter, LimiterOptions, RateLimiter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

/// Trait for rate limiting algorithms
pub trait Algorithm: Send + 'static {
    /// Stable name used in logs and API responses.
    const NAME: &'static str;

    /// Decide a request for `tokens` units at `now`, consuming capacity on grant.
    fn try_acquire(&mut self, tokens: u32, now: Instant) -> bool;

    /// Interval at which [`Algorithm::refill`] must be driven, if any.
    fn refill_interval(&self) -> Option<Duration> {
        None
    }

    fn refill(&mut self) {}

    /// Whether [`Algorithm::adjust`] takes effect. Only then is the limiter
    /// exposed as [`Reconfigurable`](crate::rate_limiter::Reconfigurable).
    const RECONFIGURABLE: bool = false;

    /// Applies already validated capacity and rate values.
    fn adjust(&mut self, _capacity: f64, _rate: f64) {}
}

/// Rejects non-positive or non-finite capacity/rate pairs.
pub fn validate_rates(capacity: f64, rate: f64) -> Result<(), LimiterError> {
    if !capacity.is_finite() || capacity <= 0.0 {
        return Err(LimiterError::InvalidConfig(format!(
            "capacity must be positive, got {}",
            capacity
        )));
    }
    if !rate.is_finite() || rate <= 0.0 {
        return Err(LimiterError::InvalidConfig(format!(
            "rate must be positive, got {}",
            rate
        )));
    }
    Ok(())
}

fn validate_window(window: Duration, limit: u32) -> Result<(), LimiterError> {
    if window.is_zero() {
        return Err(LimiterError::InvalidConfig(
            "window size must be greater than 0".to_string(),
        ));
    }
    if limit == 0 {
        return Err(LimiterError::InvalidConfig(
            "window limit must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Static description of a limiter, used to build one and to report the
/// active configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterSettings {
    TokenBucket {
        capacity: f64,
        refill_per_tick: f64,
        initial_tokens: f64,
        #[serde(with = "humantime_serde")]
        tick: Duration,
    },
    LeakyBucket {
        capacity: f64,
        leak_rate: f64,
    },
    FixedWindow {
        #[serde(with = "humantime_serde")]
        window: Duration,
        capacity: u32,
    },
    SlidingWindow {
        #[serde(with = "humantime_serde")]
        window: Duration,
        limit: u32,
    },
}

impl LimiterSettings {
    pub fn name(&self) -> &'static str {
        match self {
            LimiterSettings::TokenBucket { .. } => TokenBucket::NAME,
            LimiterSettings::LeakyBucket { .. } => LeakyBucket::NAME,
            LimiterSettings::FixedWindow { .. } => FixedWindow::NAME,
            LimiterSettings::SlidingWindow { .. } => SlidingWindow::NAME,
        }
    }

    pub fn validate(&self) -> Result<(), LimiterError> {
        match self {
            LimiterSettings::TokenBucket {
                capacity,
                refill_per_tick,
                tick,
                ..
            } => {
                validate_rates(*capacity, *refill_per_tick)?;
                if tick.is_zero() {
                    return Err(LimiterError::InvalidConfig(
                        "refill tick must be greater than 0".to_string(),
                    ));
                }
                Ok(())
            }
            LimiterSettings::LeakyBucket {
                capacity,
                leak_rate,
            } => validate_rates(*capacity, *leak_rate),
            LimiterSettings::FixedWindow { window, capacity } => validate_window(*window, *capacity),
            LimiterSettings::SlidingWindow { window, limit } => validate_window(*window, *limit),
        }
    }

    /// Records an accepted runtime reconfiguration. Window variants are left
    /// untouched since they cannot be reconfigured.
    pub fn apply_rates(&mut self, new_capacity: f64, rate: f64) {
        match self {
            LimiterSettings::TokenBucket {
                capacity,
                refill_per_tick,
                ..
            } => {
                *capacity = new_capacity;
                *refill_per_tick = rate;
            }
            LimiterSettings::LeakyBucket {
                capacity,
                leak_rate,
            } => {
                *capacity = new_capacity;
                *leak_rate = rate;
            }
            LimiterSettings::FixedWindow { .. } | LimiterSettings::SlidingWindow { .. } => {}
        }
    }

    /// Spawns the limiter task described by these settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(&self, options: LimiterOptions) -> Result<Arc<dyn RateLimiter>, LimiterError> {
        let limiter: Arc<dyn RateLimiter> = match self {
            LimiterSettings::TokenBucket {
                capacity,
                refill_per_tick,
                initial_tokens,
                tick,
            } => {
                let bucket = TokenBucket::new(*capacity, *refill_per_tick, *initial_tokens)?
                    .with_refill_interval(*tick)?;
                Arc::new(Limiter::spawn(bucket, options))
            }
            LimiterSettings::LeakyBucket {
                capacity,
                leak_rate,
            } => Arc::new(Limiter::spawn(
                LeakyBucket::new(*capacity, *leak_rate)?,
                options,
            )),
            LimiterSettings::FixedWindow { window, capacity } => Arc::new(Limiter::spawn(
                FixedWindow::new(*window, *capacity)?,
                options,
            )),
            LimiterSettings::SlidingWindow { window, limit } => Arc::new(Limiter::spawn(
                SlidingWindow::new(*limit, *window)?,
                options,
            )),
        };
        tracing::info!(algorithm = self.name(), settings = ?self, "rate limiter started");
        Ok(limiter)
    }
}
