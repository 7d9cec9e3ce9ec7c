//! Latency injection for `slow` chaos mode.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::chaos::ChaosMode;
use crate::http::server::AppState;

/// Sleep for the configured delay before the handler while chaos is `slow`.
/// A zero delay makes this a passthrough.
pub async fn chaos_delay(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.slow_delay.is_zero() && state.chaos.current() == ChaosMode::Slow {
        tokio::time::sleep(state.slow_delay).await;
    }
    next.run(request).await
}
