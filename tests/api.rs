use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use waitroom::{
    algorithms::LimiterSettings,
    broker::EventBroker,
    create_app,
    handlers::{AppState, SharedState},
    metrics::MetricsCollector,
    queue::{ManualClock, QueueManager},
    rate_limiter::LimiterOptions,
    store::MemoryStore,
};

fn single_token_bucket() -> LimiterSettings {
    LimiterSettings::TokenBucket {
        capacity: 1.0,
        refill_per_tick: 1.0,
        initial_tokens: 1.0,
        tick: Duration::from_secs(3600),
    }
}

fn state_with(settings: LimiterSettings) -> SharedState {
    let queue = Arc::new(
        QueueManager::new(Arc::new(MemoryStore::new()), "api")
            .with_clock(Arc::new(ManualClock::new(1, 1))),
    );
    let limiter = settings.build(LimiterOptions::default()).unwrap();
    Arc::new(
        AppState::new(
            queue,
            limiter,
            EventBroker::default(),
            MetricsCollector::new(),
            settings,
        )
        .with_poll_interval(Duration::from_secs(2)),
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/request")
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn put_limiter(body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/config/limiter")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_request_is_processed_then_queued() {
    let app = create_app(state_with(single_token_bucket()));

    let (status, body) = send(&app, post_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processed");
    assert!(body.get("position").is_none());

    let (status, body) = send(&app, post_request()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["position"], 0);

    let (status, body) = send(&app, post_request()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["position"], 1);
}

#[tokio::test]
async fn test_position_lookup() {
    let state = state_with(single_token_bucket());
    let app = create_app(Arc::clone(&state));

    send(&app, post_request()).await;
    let (_, queued) = send(&app, post_request()).await;
    let id = queued["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get(&format!("/api/position/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 0);
    assert_eq!(body["queue_length"], 1);
    assert_eq!(body["estimated_wait_secs"], 2.0);

    let (status, body) = send(&app, get("/api/position/missing-client")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_position_rejects_malformed_id() {
    let app = create_app(state_with(single_token_bucket()));

    let (status, _) = send(&app, get("/api/position/bad%20id")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_update_limiter_config() {
    let app = create_app(state_with(single_token_bucket()));

    let (status, _) = send(&app, put_limiter(json!({ "capacity": 0.0, "rate": 1.0 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, put_limiter(json!({ "capacity": 10.0, "refillRate": 2.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["capacity"], 10.0);
    assert_eq!(body["config"]["refill_per_tick"], 2.0);

    let (status, body) = send(&app, get("/config/limiter")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["algorithm"], "token_bucket");
    assert_eq!(body["capacity"], 10.0);
}

#[tokio::test]
async fn test_window_limiters_refuse_reconfiguration() {
    let app = create_app(state_with(LimiterSettings::FixedWindow {
        window: Duration::from_secs(1),
        capacity: 5,
    }));

    let (status, body) = send(&app, put_limiter(json!({ "capacity": 10.0, "rate": 1.0 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "unsupported");
}

#[tokio::test]
async fn test_metrics_and_health() {
    let app = create_app(state_with(single_token_bucket()));

    send(&app, post_request()).await;
    send(&app, post_request()).await;

    let (status, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_decisions"], 2);
    assert_eq!(body["denied"], 1);
    assert_eq!(body["granted"], 1);
    assert_eq!(body["queue_length"], 1);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["limiter"]["algorithm"], "token_bucket");
}

#[tokio::test]
async fn test_health_reports_stopped_limiter() {
    let state = state_with(single_token_bucket());
    let app = create_app(Arc::clone(&state));

    state.limiter.stop().await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["limiter"]["closed"], true);
}
