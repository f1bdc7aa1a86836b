use super::{validate_window, Algorithm};
use crate::error::LimiterError;
use std::time::Duration;
use tokio::time::Instant;

/// Fixed window counter. The window restarts at the first request that
/// arrives after the previous window has fully elapsed.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    window: Duration,
    capacity: u32,
    remaining: u32,
    window_start: Instant,
}

impl FixedWindow {
    pub fn new(window: Duration, capacity: u32) -> Result<Self, LimiterError> {
        validate_window(window, capacity)?;
        Ok(Self {
            window,
            capacity,
            remaining: capacity,
            window_start: Instant::now(),
        })
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Algorithm for FixedWindow {
    const NAME: &'static str = "fixed_window";

    fn try_acquire(&mut self, tokens: u32, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.remaining = self.capacity;
        }

        // An oversized request in a fresh window leaves it untouched.
        if self.remaining >= tokens {
            self.remaining -= tokens;
            true
        } else {
            false
        }
    }
}
