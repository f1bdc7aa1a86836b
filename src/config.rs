use crate::algorithms::LimiterSettings;
use crate::config_validator::ConfigValidator;
use crate::error::Error;
use crate::rate_limiter::LimiterOptions;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    TokenBucket,
    LeakyBucket,
    FixedWindow,
    SlidingWindow,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "waitroom", version, about = "Admission control and virtual waiting room")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; empty keeps the queue in process memory
    #[arg(long, env = "REDIS_URL", default_value = "")]
    pub redis_url: String,

    /// Sorted-set key holding the waiting queue
    #[arg(long, env = "QUEUE_KEY", default_value = "domain")]
    pub queue_key: String,

    #[arg(long, env = "LIMITER_ALGORITHM", value_enum, default_value_t = AlgorithmKind::TokenBucket)]
    pub algorithm: AlgorithmKind,

    /// Bucket capacity (token and leaky bucket) or tokens per window (fixed window)
    #[arg(long, env = "LIMITER_CAPACITY", default_value_t = 3.0)]
    pub capacity: f64,

    /// Refill per tick (token bucket) or leak per second (leaky bucket)
    #[arg(long, env = "LIMITER_RATE", default_value_t = 0.1)]
    pub rate: f64,

    #[arg(long, env = "LIMITER_INITIAL_TOKENS", default_value_t = 1.0)]
    pub initial_tokens: f64,

    /// Token bucket refill tick in milliseconds
    #[arg(long, env = "LIMITER_TICK_MS", default_value_t = 1000)]
    pub tick_ms: u64,

    /// Window length in milliseconds for the window algorithms
    #[arg(long, env = "LIMITER_WINDOW_MS", default_value_t = 1000)]
    pub window_ms: u64,

    /// Requests allowed per sliding window
    #[arg(long, env = "LIMITER_LIMIT", default_value_t = 5)]
    pub limit: u32,

    #[arg(long, env = "LIMITER_QUEUE_CAPACITY", default_value_t = 1024)]
    pub limiter_queue_capacity: usize,

    /// How long callers wait for room in a full limiter queue; 0 waits forever
    #[arg(long, env = "LIMITER_ENQUEUE_TIMEOUT_MS", default_value_t = 1000)]
    pub limiter_enqueue_timeout_ms: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 5000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "BROKER_CAPACITY", default_value_t = 100)]
    pub broker_capacity: usize,

    /// Deadline shared by the HTTP server and the admission worker on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from command-line arguments and environment variables
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    pub fn use_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }

    pub fn limiter_settings(&self) -> LimiterSettings {
        let window = Duration::from_millis(self.window_ms);
        match self.algorithm {
            AlgorithmKind::TokenBucket => LimiterSettings::TokenBucket {
                capacity: self.capacity,
                refill_per_tick: self.rate,
                initial_tokens: self.initial_tokens,
                tick: Duration::from_millis(self.tick_ms),
            },
            AlgorithmKind::LeakyBucket => LimiterSettings::LeakyBucket {
                capacity: self.capacity,
                leak_rate: self.rate,
            },
            AlgorithmKind::FixedWindow => LimiterSettings::FixedWindow {
                window,
                capacity: self.capacity.floor() as u32,
            },
            AlgorithmKind::SlidingWindow => LimiterSettings::SlidingWindow {
                window,
                limit: self.limit,
            },
        }
    }

    pub fn limiter_options(&self) -> LimiterOptions {
        LimiterOptions {
            queue_capacity: self.limiter_queue_capacity,
            enqueue_timeout: match self.limiter_enqueue_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.use_redis() {
            ConfigValidator::validate_redis_url(&self.redis_url)?;
        }
        ConfigValidator::validate_queue_key(&self.queue_key)?;
        ConfigValidator::validate_positive("poll interval", self.poll_interval_ms)?;
        ConfigValidator::validate_positive("broker capacity", self.broker_capacity as u64)?;
        ConfigValidator::validate_positive("limiter queue capacity", self.limiter_queue_capacity as u64)?;
        self.limiter_settings()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}
