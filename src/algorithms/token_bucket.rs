use super::{validate_rates, Algorithm};
use crate::error::LimiterError;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(1);

/// Token bucket refilled by a fixed amount once per tick.
///
/// Refill resolution equals the tick interval: no fractional refill happens
/// between ticks.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_tick: f64,
    tokens: f64,
    tick: Duration,
}

impl TokenBucket {
    /// Initial tokens are clamped into `[0, capacity]`.
    pub fn new(capacity: f64, refill_per_tick: f64, initial_tokens: f64) -> Result<Self, LimiterError> {
        validate_rates(capacity, refill_per_tick)?;
        if !initial_tokens.is_finite() {
            return Err(LimiterError::InvalidConfig(format!(
                "initial tokens must be finite, got {}",
                initial_tokens
            )));
        }

        Ok(Self {
            capacity,
            refill_per_tick,
            tokens: initial_tokens.clamp(0.0, capacity),
            tick: DEFAULT_REFILL_INTERVAL,
        })
    }

    pub fn with_refill_interval(mut self, tick: Duration) -> Result<Self, LimiterError> {
        if tick.is_zero() {
            return Err(LimiterError::InvalidConfig(
                "refill tick must be greater than 0".to_string(),
            ));
        }
        self.tick = tick;
        Ok(self)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_tick(&self) -> f64 {
        self.refill_per_tick
    }
}

impl Algorithm for TokenBucket {
    const NAME: &'static str = "token_bucket";

    fn try_acquire(&mut self, tokens: u32, _now: Instant) -> bool {
        let requested = f64::from(tokens);
        if requested <= self.tokens {
            self.tokens -= requested;
            true
        } else {
            false
        }
    }

    fn refill_interval(&self) -> Option<Duration> {
        Some(self.tick)
    }

    fn refill(&mut self) {
        self.tokens = (self.tokens + self.refill_per_tick).min(self.capacity);
    }

    const RECONFIGURABLE: bool = true;

    fn adjust(&mut self, capacity: f64, rate: f64) {
        self.capacity = capacity;
        self.refill_per_tick = rate;
        // If current tokens exceed new capacity, cap them
        self.tokens = self.tokens.min(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_consumption() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 2.0, 10.0).unwrap();
        assert!(bucket.try_acquire(5, now));
        assert_eq!(bucket.tokens(), 5.0);
        assert!(bucket.try_acquire(5, now));
        assert!(!bucket.try_acquire(1, now));
    }

    #[test]
    fn test_fractional_refill_does_not_grant() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(3.0, 0.1, 1.0).unwrap();

        assert!(bucket.try_acquire(1, now));
        assert_eq!(bucket.tokens(), 0.0);
        assert!(!bucket.try_acquire(1, now));

        bucket.refill();
        assert!((bucket.tokens() - 0.1).abs() < 1e-9);
        assert!(!bucket.try_acquire(1, now));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let mut bucket = TokenBucket::new(5.0, 1000.0, 0.0).unwrap();
        bucket.refill();
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_initial_tokens_are_clamped() {
        assert_eq!(TokenBucket::new(5.0, 1.0, 50.0).unwrap().tokens(), 5.0);
        assert_eq!(TokenBucket::new(5.0, 1.0, -3.0).unwrap().tokens(), 0.0);
    }

    #[test]
    fn test_capacity_change() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 2.0, 10.0).unwrap();
        bucket.try_acquire(5, now);

        // Reduce capacity below current tokens
        bucket.adjust(3.0, 1.0);
        assert_eq!(bucket.tokens(), 3.0);
        assert_eq!(bucket.refill_per_tick(), 1.0);

        bucket.adjust(15.0, 1.0);
        assert_eq!(bucket.capacity(), 15.0);
        assert_eq!(bucket.tokens(), 3.0);
    }

    #[test]
    fn test_rejects_zero_tick() {
        let bucket = TokenBucket::new(1.0, 1.0, 1.0).unwrap();
        assert!(bucket.with_refill_interval(Duration::ZERO).is_err());
    }
}
