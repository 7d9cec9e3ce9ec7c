//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, instrumentation, timeout)
//! - Bind the server to a listener and drain on shutdown

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::chaos::ChaosState;
use crate::config::{ChaosConfig, ServiceConfig};
use crate::http::error::ApiError;
use crate::http::handlers;
use crate::http::middleware::{chaos_delay, track_metrics};
use crate::observability::{MetricsError, ServiceMetrics};

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<ServiceMetrics>,
    pub chaos: Arc<ChaosState>,
    pub slow_delay: Duration,
}

impl AppState {
    pub fn new(metrics: Arc<ServiceMetrics>, chaos: &ChaosConfig) -> Self {
        let state = ChaosState::new(chaos.initial_mode, metrics.chaos_mode_active.clone());
        Self {
            metrics,
            chaos: Arc::new(state),
            slow_delay: Duration::from_millis(chaos.slow_delay_ms),
        }
    }
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with a fresh metrics registry.
    pub fn new(config: ServiceConfig) -> Result<Self, MetricsError> {
        let metrics = Arc::new(ServiceMetrics::new()?);
        let state = AppState::new(metrics, &config.chaos);
        Ok(Self::with_state(config, state))
    }

    /// Create a server around existing state.
    pub fn with_state(config: ServiceConfig, state: AppState) -> Self {
        let router = build_router(
            state.clone(),
            Duration::from_secs(config.timeouts.request_secs),
        );
        Self {
            router,
            config,
            state,
        }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            chaos_mode = %self.state.chaos.current(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    with_layers(routes(), state, request_timeout)
}

/// Service routes and the JSON 404 fallback, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/simulate-error", get(handlers::simulate_error))
        .route("/chaos/{mode}", get(handlers::set_chaos))
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::not_found)
}

/// Wrap `router` in the full middleware stack and attach `state`.
#[allow(deprecated)]
pub fn with_layers(
    router: Router<AppState>,
    state: AppState,
    request_timeout: Duration,
) -> Router {
    router
        .layer(middleware::from_fn_with_state(state.clone(), chaos_delay))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::Internal.into_response()
}
