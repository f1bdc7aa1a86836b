use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use waitroom::{
    algorithms::{LimiterSettings, TokenBucket},
    broker::EventBroker,
    queue::{ManualClock, QueueManager},
    rate_limiter::{Limiter, LimiterOptions, RateLimiter},
    store::MemoryStore,
    worker::{AdmissionWorker, PollOutcome},
    QueueError,
};

fn queue(key: &str) -> Arc<QueueManager> {
    Arc::new(
        QueueManager::new(Arc::new(MemoryStore::new()), key)
            .with_clock(Arc::new(ManualClock::new(1_000, 10))),
    )
}

#[tokio::test(start_paused = true)]
async fn test_worker_admits_head_once_per_refill() {
    let queue = queue("flow");
    let limiter = LimiterSettings::TokenBucket {
        capacity: 1.0,
        refill_per_tick: 1.0,
        initial_tokens: 0.0,
        tick: Duration::from_secs(1),
    }
    .build(LimiterOptions::default())
    .unwrap();
    let broker = EventBroker::default();
    let mut subscription = broker.subscribe();

    for id in ["A", "B", "C"] {
        queue.add_client(id).await.unwrap();
    }

    let worker = AdmissionWorker::new(Arc::clone(&queue), Arc::clone(&limiter), broker)
        .with_poll_interval(Duration::from_secs(5))
        .spawn();

    sleep(Duration::from_millis(5_500)).await;

    let notification = subscription.try_recv().expect("A should be announced");
    assert_eq!(notification.client_id, "A");
    assert!(subscription.try_recv().is_none());

    assert!(matches!(
        queue.get_client_position("A").await,
        Err(QueueError::NotFound(_))
    ));
    assert_eq!(queue.get_client_position("B").await.unwrap(), 0);
    assert_eq!(queue.get_client_position("C").await.unwrap(), 1);

    assert!(worker.shutdown(Instant::now() + Duration::from_secs(1)).await);
    limiter.stop().await;
}

#[tokio::test]
async fn test_denied_head_keeps_its_place() {
    let queue = queue("deferred");
    let limiter: Arc<dyn RateLimiter> =
        Arc::new(Limiter::new(TokenBucket::new(1.0, 1.0, 0.0).unwrap()
            .with_refill_interval(Duration::from_secs(3600))
            .unwrap()));
    let worker = AdmissionWorker::new(Arc::clone(&queue), Arc::clone(&limiter), EventBroker::default());

    queue.add_client("first").await.unwrap();
    queue.add_client("second").await.unwrap();

    assert_eq!(
        worker.poll_once().await.unwrap(),
        PollOutcome::Deferred("first".to_string())
    );
    assert_eq!(queue.get_top_n_clients(2).await.unwrap(), vec!["first", "second"]);

    limiter.stop().await;
}

#[tokio::test]
async fn test_positions_follow_arrival_order() {
    let queue = queue("order");
    let ids: Vec<String> = (0..20).map(|i| format!("client-{}", i)).collect();

    for id in &ids {
        queue.add_client(id).await.unwrap();
    }

    for (expected, id) in ids.iter().enumerate() {
        assert_eq!(queue.get_client_position(id).await.unwrap(), expected as u64);
    }
    assert_eq!(queue.get_total_clients().await.unwrap(), 20);

    queue.remove_client("client-0").await.unwrap();
    assert_eq!(queue.get_client_position("client-1").await.unwrap(), 0);
    assert_eq!(queue.get_next_client().await.unwrap().as_deref(), Some("client-1"));
    assert_eq!(queue.get_total_clients().await.unwrap(), 18);
}

#[tokio::test]
async fn test_stopped_limiter_defers_everyone() {
    let queue = queue("stopped");
    let limiter: Arc<dyn RateLimiter> =
        Arc::new(Limiter::new(TokenBucket::new(5.0, 1.0, 5.0).unwrap()));
    let broker = EventBroker::default();
    let mut subscription = broker.subscribe();
    let worker = AdmissionWorker::new(Arc::clone(&queue), Arc::clone(&limiter), broker);

    queue.add_client("late").await.unwrap();
    limiter.stop().await;

    assert_eq!(
        worker.poll_once().await.unwrap(),
        PollOutcome::Deferred("late".to_string())
    );
    assert!(subscription.try_recv().is_none());
    assert_eq!(queue.get_total_clients().await.unwrap(), 1);
}
