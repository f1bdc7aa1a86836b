use crate::broker::EventBroker;
use crate::config::Config;
use crate::error::{Error, QueueError};
use crate::handlers::{
    client_position, events, get_limiter_config, health_check, metrics, request_admission,
    update_limiter_config, AppState, SharedState,
};
use crate::metrics::MetricsCollector;
use crate::queue::QueueManager;
use crate::redis::RedisStore;
use crate::store::{MemoryStore, OrderedStore};
use crate::worker::AdmissionWorker;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_app(state: SharedState) -> Router {
    Router::new()
        // Waiting room endpoints
        .route("/api/request", post(request_admission))
        .route("/api/position/:id", get(client_position))
        .route("/api/events", get(events))
        // Operations
        .route(
            "/config/limiter",
            get(get_limiter_config).put(update_limiter_config),
        )
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

pub struct Server {
    config: Config,
    state: SharedState,
    worker: AdmissionWorker,
}

impl Server {
    /// Connects the store and starts the limiter task. The admission worker
    /// only starts once [`Server::run`] is called.
    pub async fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let store: Arc<dyn OrderedStore> = if config.use_redis() {
            Arc::new(
                RedisStore::connect(&config.redis_url)
                    .await
                    .map_err(QueueError::from)?,
            )
        } else {
            tracing::warn!("REDIS_URL is empty, the queue is kept in process memory");
            Arc::new(MemoryStore::new())
        };

        let queue = Arc::new(QueueManager::new(store, config.queue_key.clone()));
        let settings = config.limiter_settings();
        let limiter = settings.build(config.limiter_options())?;
        let broker = EventBroker::new(config.broker_capacity);
        let metrics = MetricsCollector::new();

        let worker = AdmissionWorker::new(Arc::clone(&queue), Arc::clone(&limiter), broker.clone())
            .with_poll_interval(config.poll_interval())
            .with_metrics(metrics.clone());
        let state = Arc::new(
            AppState::new(queue, limiter, broker, metrics, settings)
                .with_poll_interval(worker.poll_interval()),
        );

        Ok(Self {
            config,
            state,
            worker,
        })
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("Waitroom server listening on {}", self.config.bind_addr);
        tracing::info!("Health check available at /health");

        let worker = self.worker.spawn();
        let (stop_http, mut http_stopped) = watch::channel(false);
        let app = create_app(Arc::clone(&self.state));
        let mut http = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = http_stopped.changed().await;
                })
                .await
        });

        let finished_early = tokio::select! {
            _ = shutdown_signal() => false,
            result = &mut http => {
                tracing::error!(result = ?result, "HTTP server exited unexpectedly");
                true
            }
        };

        // One deadline bounds both the HTTP drain and the worker.
        let deadline = Instant::now() + self.config.shutdown_timeout();
        let _ = stop_http.send(true);

        if !finished_early {
            match time::timeout_at(deadline, &mut http).await {
                Ok(Ok(Ok(()))) => tracing::info!("HTTP server drained"),
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server error"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
                Err(_) => {
                    tracing::warn!("HTTP server missed the shutdown deadline, closing connections");
                    http.abort();
                }
            }
        }

        worker.shutdown(deadline).await;
        self.state.limiter.stop().await;

        tracing::info!("Server stopped gracefully");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
