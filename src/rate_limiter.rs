//! Single-owner limiter tasks.
//!
//! A [`Limiter`] moves an [`Algorithm`] into a dedicated Tokio task. Every
//! decision travels over a bounded channel with a oneshot reply slot, so the
//! algorithm state is only ever touched by that task and requests are decided
//! in the order they were enqueued.

use crate::algorithms::{
    validate_rates, Algorithm, FixedWindow, LeakyBucket, SlidingWindow, TokenBucket,
};
use crate::error::LimiterError;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a single admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
    /// The limiter has been stopped.
    Closed,
    /// Zero tokens were requested.
    InvalidArgument,
    /// The request queue stayed full for the whole enqueue timeout.
    Busy,
}

impl Decision {
    pub fn is_granted(self) -> bool {
        matches!(self, Decision::Granted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Granted => "granted",
            Decision::Denied => "denied",
            Decision::Closed => "closed",
            Decision::InvalidArgument => "invalid_argument",
            Decision::Busy => "busy",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LimiterOptions {
    /// Bound of the inbound request queue.
    pub queue_capacity: usize,
    /// How long a caller waits for room in a full queue. `None` waits forever.
    pub enqueue_timeout: Option<Duration>,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout: Some(DEFAULT_ENQUEUE_TIMEOUT),
        }
    }
}

/// Capability contract shared by every limiter variant.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn algorithm(&self) -> &'static str;

    async fn decide(&self, tokens: u32) -> Decision;

    /// Fails closed: anything but a grant is `false`.
    async fn allow(&self, tokens: u32) -> bool {
        self.decide(tokens).await.is_granted()
    }

    /// Cancels the owning task and waits for it to exit.
    async fn stop(&self);

    fn is_closed(&self) -> bool;

    /// Runtime reconfiguration, only offered by variants that support it.
    fn as_reconfigurable(&self) -> Option<&dyn Reconfigurable> {
        None
    }
}

#[async_trait]
pub trait Reconfigurable: Send + Sync {
    async fn update_config(&self, capacity: f64, rate: f64) -> Result<(), LimiterError>;
}

enum Command<A> {
    Acquire {
        tokens: u32,
        reply: oneshot::Sender<bool>,
    },
    Apply(Box<dyn FnOnce(&mut A) + Send>),
}

/// Handle to an algorithm running in its own task.
pub struct Limiter<A: Algorithm> {
    commands: mpsc::Sender<Command<A>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    enqueue_timeout: Option<Duration>,
}

impl<A: Algorithm> Limiter<A> {
    /// Spawns the owning task. Must be called from within a Tokio runtime.
    pub fn spawn(algorithm: A, options: LimiterOptions) -> Self {
        let (commands, inbox) = mpsc::channel(options.queue_capacity.max(1));
        let (shutdown, stop_signal) = watch::channel(false);
        let task = tokio::spawn(run(algorithm, inbox, stop_signal));

        Self {
            commands,
            shutdown,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
            enqueue_timeout: options.enqueue_timeout,
        }
    }

    pub fn new(algorithm: A) -> Self {
        Self::spawn(algorithm, LimiterOptions::default())
    }

    pub async fn acquire(&self, tokens: u32) -> Decision {
        if tokens == 0 {
            return Decision::InvalidArgument;
        }
        if self.closed.load(Ordering::Acquire) {
            return Decision::Closed;
        }

        let (reply, response) = oneshot::channel();
        let command = Command::Acquire { tokens, reply };
        let sent = match self.enqueue_timeout {
            Some(timeout) => match self.commands.send_timeout(command, timeout).await {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(Decision::Busy),
                Err(SendTimeoutError::Closed(_)) => Err(Decision::Closed),
            },
            None => self.commands.send(command).await.map_err(|_| Decision::Closed),
        };
        if let Err(decision) = sent {
            return decision;
        }

        // A dropped reply slot means the task exited before reaching this request.
        match response.await {
            Ok(true) => Decision::Granted,
            Ok(false) => Decision::Denied,
            Err(_) => Decision::Closed,
        }
    }

    /// Runs `f` against the algorithm state inside the owning task.
    pub async fn apply<R, F>(&self, f: F) -> Result<R, LimiterError>
    where
        R: Send + 'static,
        F: FnOnce(&mut A) -> R + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(LimiterError::Closed);
        }

        let (reply, response) = oneshot::channel();
        let job = Box::new(move |algorithm: &mut A| {
            let _ = reply.send(f(algorithm));
        });
        self.commands
            .send(Command::Apply(job))
            .await
            .map_err(|_| LimiterError::Closed)?;
        response.await.map_err(|_| LimiterError::Closed)
    }

    /// Read-only view of the algorithm state.
    pub async fn inspect<R, F>(&self, f: F) -> Result<R, LimiterError>
    where
        R: Send + 'static,
        F: FnOnce(&A) -> R + Send + 'static,
    {
        self.apply(move |algorithm| f(algorithm)).await
    }

    pub async fn shutdown(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            let _ = self.shutdown.send(true);
            if let Err(e) = handle.await {
                tracing::error!(algorithm = A::NAME, error = %e, "limiter task failed");
            }
            info!(algorithm = A::NAME, "rate limiter stopped");
        }
        self.closed.store(true, Ordering::Release);
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn adjust(&self, capacity: f64, rate: f64) -> Result<(), LimiterError> {
        if !A::RECONFIGURABLE {
            return Err(LimiterError::Unsupported(A::NAME));
        }
        validate_rates(capacity, rate)?;
        self.apply(move |algorithm| algorithm.adjust(capacity, rate))
            .await?;
        info!(algorithm = A::NAME, capacity, rate, "rate limiter reconfigured");
        Ok(())
    }
}

async fn run<A: Algorithm>(
    mut algorithm: A,
    mut inbox: mpsc::Receiver<Command<A>>,
    mut stop_signal: watch::Receiver<bool>,
) {
    let mut ticker = algorithm.refill_interval().map(|period| {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            biased;

            _ = stop_signal.changed() => break,
            _ = next_tick(&mut ticker) => algorithm.refill(),
            command = inbox.recv() => match command {
                Some(Command::Acquire { tokens, reply }) => {
                    let granted = algorithm.try_acquire(tokens, Instant::now());
                    let _ = reply.send(granted);
                }
                Some(Command::Apply(job)) => job(&mut algorithm),
                None => break,
            },
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub type TokenBucketLimiter = Limiter<TokenBucket>;
pub type LeakyBucketLimiter = Limiter<LeakyBucket>;
pub type FixedWindowLimiter = Limiter<FixedWindow>;
pub type SlidingWindowLimiter = Limiter<SlidingWindow>;

#[async_trait]
impl<A: Algorithm> RateLimiter for Limiter<A> {
    fn algorithm(&self) -> &'static str {
        A::NAME
    }

    async fn decide(&self, tokens: u32) -> Decision {
        let decision = self.acquire(tokens).await;
        debug!(algorithm = A::NAME, tokens, decision = %decision, "admission decision");
        decision
    }

    async fn stop(&self) {
        self.shutdown().await
    }

    fn is_closed(&self) -> bool {
        self.closed()
    }

    fn as_reconfigurable(&self) -> Option<&dyn Reconfigurable> {
        if A::RECONFIGURABLE {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl<A: Algorithm> Reconfigurable for Limiter<A> {
    async fn update_config(&self, capacity: f64, rate: f64) -> Result<(), LimiterError> {
        self.adjust(capacity, rate).await
    }
}
