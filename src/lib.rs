pub mod algorithms;
pub mod broker;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;
pub mod store;
pub mod worker;

pub use algorithms::LimiterSettings;
pub use broker::{EventBroker, Notification, Subscription};
pub use config::Config;
pub use error::{Error, LimiterError, QueueError, Result, StoreError};
pub use queue::QueueManager;
pub use rate_limiter::{Decision, Limiter, LimiterOptions, RateLimiter, Reconfigurable};
pub use server::create_app;
pub use worker::{AdmissionWorker, PollOutcome};
