//! Sliding window log algorithm
//!
//! Keeps one timestamp per granted token and counts how many fall inside the
//! trailing window.

use super::{validate_window, Algorithm};
use crate::error::LimiterError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: u32,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Result<Self, LimiterError> {
        validate_window(window, limit)?;
        Ok(Self {
            limit,
            window,
            timestamps: VecDeque::new(),
        })
    }

    /// Number of timestamps currently held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.timestamps.front().is_some_and(|ts| *ts < cutoff) {
            self.timestamps.pop_front();
        }
    }
}

impl Algorithm for SlidingWindow {
    const NAME: &'static str = "sliding_window";

    fn try_acquire(&mut self, tokens: u32, now: Instant) -> bool {
        self.prune(now);

        // A denied request leaves no timestamps behind, so the log only ever
        // holds tokens that were actually granted.
        let requested = tokens as usize;
        if self.timestamps.len() + requested > self.limit as usize {
            return false;
        }
        self.timestamps.extend(std::iter::repeat(now).take(requested));
        true
    }
}
