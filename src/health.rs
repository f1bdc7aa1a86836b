use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::rate_limiter::RateLimiter;
use crate::store::OrderedStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
    pub limiter: LimiterStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LimiterStatus {
    pub algorithm: String,
    pub closed: bool,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    store: Arc<dyn OrderedStore>,
    limiter: Arc<dyn RateLimiter>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn OrderedStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { store, limiter }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let store_status = self.check_store().await;
        let closed = self.limiter.is_closed();

        let overall_status = if store_status.status != "healthy" || closed {
            "unhealthy"
        } else {
            "healthy"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                store: store_status,
            },
            limiter: LimiterStatus {
                algorithm: self.limiter.algorithm().to_string(),
                closed,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        let start = Instant::now();
        let result = self.store.ping().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => ServiceStatus {
                status: "unavailable".to_string(),
                response_time_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::TokenBucket;
    use crate::rate_limiter::Limiter;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_health_reflects_limiter_state() {
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(Limiter::new(TokenBucket::new(1.0, 1.0, 1.0).unwrap()));
        let checker = HealthChecker::new(Arc::new(MemoryStore::new()), Arc::clone(&limiter));

        let status = checker.check_health().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.limiter.algorithm, "token_bucket");

        limiter.stop().await;
        let status = checker.check_health().await;
        assert_eq!(status.status, "unhealthy");
        assert!(status.limiter.closed);
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            dependencies: DependencyStatus {
                store: ServiceStatus {
                    status: "healthy".to_string(),
                    response_time_ms: 5,
                    error: None,
                },
            },
            limiter: LimiterStatus {
                algorithm: "leaky_bucket".to_string(),
                closed: false,
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("leaky_bucket"));
        assert!(json.contains("1234567890"));
    }
}
