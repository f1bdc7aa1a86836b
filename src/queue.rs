//! Arrival-ordered waiting queue.
//!
//! Clients are scored by their arrival time in nanoseconds, so queue order is
//! only as good as the clock shared by every instance writing to the store.

use crate::error::QueueError;
use crate::store::{OrderedStore, PopOutcome};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const DEFAULT_POP_ATTEMPTS: usize = 3;

/// Source of arrival scores.
pub trait Clock: Send + Sync {
    fn arrival_score(&self) -> f64;
}

/// Wall-clock nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn arrival_score(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as f64
    }
}

/// Deterministic clock advancing by a fixed step on every reading.
#[derive(Debug)]
pub struct ManualClock {
    next: AtomicU64,
    step: u64,
}

impl ManualClock {
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl Clock for ManualClock {
    fn arrival_score(&self) -> f64 {
        self.next.fetch_add(self.step, Ordering::SeqCst) as f64
    }
}

pub struct QueueManager {
    store: Arc<dyn OrderedStore>,
    queue_key: String,
    clock: Arc<dyn Clock>,
    pop_attempts: usize,
}

impl fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueManager")
            .field("queue_key", &self.queue_key)
            .field("pop_attempts", &self.pop_attempts)
            .finish_non_exhaustive()
    }
}

impl QueueManager {
    pub fn new(store: Arc<dyn OrderedStore>, queue_key: impl Into<String>) -> Self {
        Self {
            store,
            queue_key: queue_key.into(),
            clock: Arc::new(SystemClock),
            pop_attempts: DEFAULT_POP_ATTEMPTS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pop_attempts(mut self, attempts: usize) -> Self {
        self.pop_attempts = attempts.max(1);
        self
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn store(&self) -> &Arc<dyn OrderedStore> {
        &self.store
    }

    /// Appends a client at the tail, scored by the current time.
    pub async fn add_client(&self, client_id: &str) -> Result<(), QueueError> {
        let score = self.clock.arrival_score();
        self.store.insert(&self.queue_key, client_id, score).await?;
        debug!(queue = %self.queue_key, client_id, score, "client enqueued");
        Ok(())
    }

    /// Removing an absent client succeeds.
    pub async fn remove_client(&self, client_id: &str) -> Result<(), QueueError> {
        let removed = self.store.remove(&self.queue_key, client_id).await?;
        debug!(queue = %self.queue_key, client_id, removed, "client removed");
        Ok(())
    }

    /// Zero-indexed position of a client.
    pub async fn get_client_position(&self, client_id: &str) -> Result<u64, QueueError> {
        self.store
            .rank(&self.queue_key, client_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(client_id.to_string()))
    }

    pub async fn get_total_clients(&self) -> Result<u64, QueueError> {
        Ok(self.store.cardinality(&self.queue_key).await?)
    }

    /// The first `n` clients in arrival order, without removing them.
    pub async fn get_top_n_clients(&self, n: u64) -> Result<Vec<String>, QueueError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        Ok(self.store.range(&self.queue_key, 0, n - 1).await?)
    }

    /// Atomically removes and returns the head of the queue.
    ///
    /// Concurrent callers never receive the same client. Conflicting
    /// transactions are retried; once the attempts are spent the call fails
    /// with [`QueueError::Contention`].
    pub async fn get_next_client(&self) -> Result<Option<String>, QueueError> {
        for attempt in 1..=self.pop_attempts {
            match self.store.pop_lowest(&self.queue_key).await? {
                PopOutcome::Popped(client_id) => return Ok(Some(client_id)),
                PopOutcome::Empty => return Ok(None),
                PopOutcome::Conflict => {
                    debug!(queue = %self.queue_key, attempt, "queue pop conflicted, retrying");
                }
            }
        }

        warn!(queue = %self.queue_key, attempts = self.pop_attempts, "queue pop contention");
        Err(QueueError::Contention {
            attempts: self.pop_attempts,
        })
    }
}
