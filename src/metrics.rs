use crate::rate_limiter::Decision;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionMetrics {
    pub total_decisions: u64,
    pub granted: u64,
    pub denied: u64,
    pub closed: u64,
    pub busy: u64,
    pub invalid: u64,
    /// Clients released from the queue by the admission worker.
    pub admitted: u64,
    /// Worker polls where the head client had to keep waiting.
    pub deferred: u64,
    pub queue_length: Option<u64>,
    pub last_reset: u64,
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self {
            total_decisions: 0,
            granted: 0,
            denied: 0,
            closed: 0,
            busy: 0,
            invalid: 0,
            admitted: 0,
            deferred: 0,
            queue_length: None,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Counters handed to the components that report into them.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<AdmissionMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_decision(&self, decision: Decision) {
        let mut metrics = self.metrics.write().await;
        metrics.total_decisions += 1;
        match decision {
            Decision::Granted => metrics.granted += 1,
            Decision::Denied => metrics.denied += 1,
            Decision::Closed => metrics.closed += 1,
            Decision::Busy => metrics.busy += 1,
            Decision::InvalidArgument => metrics.invalid += 1,
        }
    }

    pub async fn record_admission(&self) {
        self.metrics.write().await.admitted += 1;
    }

    pub async fn record_deferral(&self) {
        self.metrics.write().await.deferred += 1;
    }

    pub async fn set_queue_length(&self, length: u64) {
        self.metrics.write().await.queue_length = Some(length);
    }

    pub async fn snapshot(&self) -> AdmissionMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = AdmissionMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decisions_are_counted_by_kind() {
        let metrics = MetricsCollector::new();
        metrics.record_decision(Decision::Granted).await;
        metrics.record_decision(Decision::Denied).await;
        metrics.record_decision(Decision::Denied).await;
        metrics.record_decision(Decision::Closed).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.total_decisions, 4);
        assert_eq!(snapshot.granted, 1);
        assert_eq!(snapshot.denied, 2);
        assert_eq!(snapshot.closed, 1);
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let metrics = MetricsCollector::new();
        let worker_side = metrics.clone();
        worker_side.record_admission().await;
        worker_side.set_queue_length(7).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.admitted, 1);
        assert_eq!(snapshot.queue_length, Some(7));

        metrics.reset().await;
        assert_eq!(worker_side.snapshot().await.admitted, 0);
    }
}
