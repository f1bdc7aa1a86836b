//! Background admission of queued clients.

use crate::broker::EventBroker;
use crate::error::QueueError;
use crate::metrics::MetricsCollector;
use crate::queue::QueueManager;
use crate::rate_limiter::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Shortest interval the worker accepts; `interval_at` rejects zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The queue was empty.
    Idle,
    /// The head client was granted a token, announced and dequeued.
    Admitted(String),
    /// The limiter denied the head client; it keeps its place.
    Deferred(String),
}

/// Drains the head of the queue against the limiter on a fixed interval.
pub struct AdmissionWorker {
    queue: Arc<QueueManager>,
    limiter: Arc<dyn RateLimiter>,
    broker: EventBroker,
    metrics: Option<MetricsCollector>,
    poll_interval: Duration,
}

impl AdmissionWorker {
    pub fn new(queue: Arc<QueueManager>, limiter: Arc<dyn RateLimiter>, broker: EventBroker) -> Self {
        Self {
            queue,
            limiter,
            broker,
            metrics: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = poll_interval.as_millis() as u64,
                "poll interval below minimum, clamping to 1ms"
            );
        }
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs a single admission attempt for the head of the queue.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        let head = self.queue.get_top_n_clients(1).await?;
        let Some(client_id) = head.into_iter().next() else {
            return Ok(PollOutcome::Idle);
        };

        let decision = self.limiter.decide(1).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision).await;
        }

        if !decision.is_granted() {
            if let Some(metrics) = &self.metrics {
                metrics.record_deferral().await;
            }
            return Ok(PollOutcome::Deferred(client_id));
        }

        let delivered = self.broker.publish(client_id.clone());
        self.queue.remove_client(&client_id).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_admission().await;
        }
        info!(client_id = %client_id, subscribers = delivered, "client admitted");

        Ok(PollOutcome::Admitted(client_id))
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped. A poll
    /// that has started always runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            queue = %self.queue.queue_key(),
            algorithm = self.limiter.algorithm(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "admission worker started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => match self.poll_once().await {
                    Ok(outcome) => debug!(outcome = ?outcome, "admission poll"),
                    Err(e) => warn!(error = %e, "admission poll failed, skipping tick"),
                },
            }
        }

        info!("admission worker stopped");
    }

    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(self.run(signal));
        WorkerHandle { shutdown, task }
    }
}

pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signals the worker and waits for it until `deadline`. A worker still
    /// running at the deadline is aborted. Returns whether it exited cleanly.
    pub async fn shutdown(self, deadline: Instant) -> bool {
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "admission worker task failed");
                false
            }
            Err(_) => {
                warn!("admission worker missed the shutdown deadline, aborting");
                task.abort();
                false
            }
        }
    }
}
