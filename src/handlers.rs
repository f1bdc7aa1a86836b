use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::algorithms::LimiterSettings;
use crate::broker::EventBroker;
use crate::config_validator::ConfigValidator;
use crate::error::{Error, LimiterError, QueueError};
use crate::health::HealthChecker;
use crate::metrics::MetricsCollector;
use crate::queue::QueueManager;
use crate::rate_limiter::RateLimiter;
use crate::response::{AdmissionResponse, ConfigResponse, PositionResponse, ProcessedEvent};
use crate::worker::DEFAULT_POLL_INTERVAL;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub queue: Arc<QueueManager>,
    pub limiter: Arc<dyn RateLimiter>,
    pub broker: EventBroker,
    pub metrics: MetricsCollector,
    /// Last accepted limiter configuration, kept in step with reconfiguration.
    pub limiter_settings: RwLock<LimiterSettings>,
    pub health: HealthChecker,
    /// Worker poll interval, used to estimate waiting time.
    pub poll_interval: Duration,
}

impl AppState {
    pub fn new(
        queue: Arc<QueueManager>,
        limiter: Arc<dyn RateLimiter>,
        broker: EventBroker,
        metrics: MetricsCollector,
        limiter_settings: LimiterSettings,
    ) -> Self {
        let health = HealthChecker::new(Arc::clone(queue.store()), Arc::clone(&limiter));
        Self {
            queue,
            limiter,
            broker,
            metrics,
            limiter_settings: RwLock::new(limiter_settings),
            health,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LimiterUpdateRequest {
    #[validate(range(exclusive_min = 0.0))]
    pub capacity: f64,
    #[serde(alias = "refillRate")]
    #[validate(range(exclusive_min = 0.0))]
    pub rate: f64,
}

/// Admits the caller immediately when nobody is waiting and the limiter has
/// room, otherwise places it at the back of the queue.
pub async fn request_admission(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, Error> {
    let waiting = state.queue.get_total_clients().await?;
    let client_id = Uuid::new_v4().to_string();

    if waiting == 0 {
        let decision = state.limiter.decide(1).await;
        state.metrics.record_decision(decision).await;
        if decision.is_granted() {
            info!(client_id = %client_id, "client admitted without queueing");
            return Ok((StatusCode::OK, Json(AdmissionResponse::processed(client_id))));
        }
    }

    state.queue.add_client(&client_id).await?;
    match state.queue.get_client_position(&client_id).await {
        Ok(position) => Ok((
            StatusCode::ACCEPTED,
            Json(AdmissionResponse::queued(client_id, position)),
        )),
        // The worker already admitted it.
        Err(QueueError::NotFound(_)) => {
            Ok((StatusCode::OK, Json(AdmissionResponse::processed(client_id))))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn client_position(
    State(state): State<SharedState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    ConfigValidator::validate_client_id(&client_id)?;

    let position = state.queue.get_client_position(&client_id).await?;
    let queue_length = state.queue.get_total_clients().await?;

    Ok(Json(PositionResponse::new(
        client_id,
        position,
        queue_length,
        state.poll_interval,
    )))
}

/// Server-sent stream of admission events.
pub async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = state
        .broker
        .subscribe()
        .into_stream()
        .map(|notification| Event::default().json_data(ProcessedEvent::new(notification.client_id)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn get_limiter_config(State(state): State<SharedState>) -> impl IntoResponse {
    let settings = state.limiter_settings.read().await;
    Json(settings.clone())
}

pub async fn update_limiter_config(
    State(state): State<SharedState>,
    Json(payload): Json<LimiterUpdateRequest>,
) -> Result<impl IntoResponse, Error> {
    payload
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let reconfigurable = state
        .limiter
        .as_reconfigurable()
        .ok_or(LimiterError::Unsupported(state.limiter.algorithm()))?;

    let mut settings = state.limiter_settings.write().await;
    reconfigurable
        .update_config(payload.capacity, payload.rate)
        .await?;
    settings.apply_rates(payload.capacity, payload.rate);

    let config = serde_json::to_value(&*settings).map_err(|e| Error::Config(e.to_string()))?;
    Ok(Json(ConfigResponse::updated(config)))
}

pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    match state.queue.get_total_clients().await {
        Ok(length) => state.metrics.set_queue_length(length).await,
        Err(e) => warn!(error = %e, "could not refresh queue length"),
    }

    Json(state.metrics.snapshot().await)
}

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(status))
}
