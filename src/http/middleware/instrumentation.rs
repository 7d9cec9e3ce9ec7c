//! Per-request instrumentation.
//!
//! # Route label
//! `route` is axum's matched route template, so the chaos endpoint reports
//! as `route="/chaos/{mode}"`. Earlier deployments labelled it
//! `/chaos/:mode`; dashboard and alert queries filtering on the old value
//! must be updated. Requests that match no route use the raw request path.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::http::server::AppState;
use crate::observability::Gauge;

/// Holds one unit of the in-flight gauge and gives it back on drop.
///
/// Dropping happens exactly once whether the response completes or the
/// request future is cancelled (client disconnect).
pub struct InflightGuard {
    gauge: Gauge,
}

impl InflightGuard {
    pub fn acquire(gauge: &Gauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Record request count, latency and errors for every request.
///
/// The route label is the matched route template, or the raw path when no
/// route matched.
pub async fn track_metrics(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let _inflight = InflightGuard::acquire(&state.metrics.inflight_requests);
    let start = Instant::now();

    let method = request.method().as_str().to_owned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    if let Err(e) = state
        .metrics
        .record_request(&method, &route, status, elapsed)
    {
        tracing::warn!(error = %e, route = %route, "Failed to record request metrics");
    }

    tracing::debug!(
        method = %method,
        route = %route,
        status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request completed"
    );

    response
}
