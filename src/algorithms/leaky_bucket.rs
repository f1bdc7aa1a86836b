use super::{validate_rates, Algorithm};
use crate::error::LimiterError;
use tokio::time::Instant;

/// Leaky bucket drained lazily at request time.
///
/// The bucket starts full. Each request leaks `leak_rate` per whole second
/// since the previous request, and any fraction of a second is dropped.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    capacity: f64,
    leak_rate: f64,
    occupied: f64,
    last_leak: Instant,
}

impl LeakyBucket {
    pub fn new(capacity: f64, leak_rate: f64) -> Result<Self, LimiterError> {
        validate_rates(capacity, leak_rate)?;
        Ok(Self {
            capacity,
            leak_rate,
            occupied: capacity,
            last_leak: Instant::now(),
        })
    }

    pub fn occupied(&self) -> f64 {
        self.occupied
    }

    fn leak(&mut self, now: Instant) {
        let whole_secs = now.saturating_duration_since(self.last_leak).as_secs();
        let leaked = self.leak_rate * whole_secs as f64;
        self.occupied = (self.occupied - leaked).max(0.0);
        self.last_leak = now;
    }
}

impl Algorithm for LeakyBucket {
    const NAME: &'static str = "leaky_bucket";

    fn try_acquire(&mut self, tokens: u32, now: Instant) -> bool {
        self.leak(now);

        let requested = f64::from(tokens);
        if self.occupied + requested <= self.capacity {
            self.occupied += requested;
            true
        } else {
            false
        }
    }

    const RECONFIGURABLE: bool = true;

    fn adjust(&mut self, capacity: f64, rate: f64) {
        self.capacity = capacity;
        self.leak_rate = rate;
        self.occupied = self.occupied.min(capacity);
    }
}
