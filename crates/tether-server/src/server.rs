//! `TetherServer`: router, listener, and shutdown wiring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tether_core::{SessionHandler, SessionRegistry};
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::intake::intake_handler;
use crate::metrics;
use crate::push::push_handler;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session table shared by push and intake.
    pub registry: Arc<SessionRegistry>,
    /// Runs on every session once its handshake is out.
    pub handler: Arc<dyn SessionHandler>,
    /// Tracks session handler tasks for shutdown.
    pub tracker: TaskTracker,
    /// Intake route advertised in the handshake.
    pub messages_path: Arc<str>,
    /// Keep-alive comment interval on push streams.
    pub keep_alive: Duration,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics` when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The tether HTTP server.
pub struct TetherServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn SessionHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl TetherServer {
    /// Create a server. `config` is expected to have passed
    /// [`ServerConfig::validate`].
    pub fn new(config: ServerConfig, handler: impl SessionHandler) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(SessionRegistry::with_parent(config.registry_config(), shutdown.token()));
        Self {
            config,
            registry,
            handler: Arc::new(handler),
            shutdown,
            tracker: TaskTracker::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            handler: self.handler.clone(),
            tracker: self.tracker.clone(),
            messages_path: Arc::from(self.config.messages_path.as_str()),
            keep_alive: self.config.keep_alive_interval(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let messages_path = self.config.messages_path.as_str();
        let mut router = Router::new()
            .route(&self.config.sse_path, get(push_handler))
            .route(messages_path, post(intake_handler));
        let bare = messages_path.trim_end_matches('/');
        if bare != messages_path && !bare.is_empty() {
            router = router.route(bare, post(intake_handler));
        }

        router
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr()).await
    }

    /// Serve on `listener` until [`ShutdownCoordinator::shutdown`], then close
    /// every session and wait for session tasks.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            sse_path = %self.config.sse_path,
            messages_path = %self.config.messages_path,
            "tether server listening"
        );

        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        let closed = self.registry.close_all();
        info!(closed, "listener stopped");
        let _ = self
            .shutdown
            .graceful_shutdown(&self.tracker, self.config.shutdown_timeout())
            .await;
        Ok(())
    }

    /// Bind and serve.
    pub async fn listen(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(handle),
        )
            .into_response(),
        None => ApiError::new(StatusCode::NOT_FOUND, "METRICS_DISABLED", "metrics recorder not installed")
            .into_response(),
    }
}
