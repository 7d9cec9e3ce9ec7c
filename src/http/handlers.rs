//! Route handlers.
//!
//! Every JSON body uses camelCase keys and an ISO-8601 UTC timestamp with
//! millisecond precision.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::chaos::ChaosMode;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics::CONTENT_TYPE;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: &'static str,
    pub metrics: &'static str,
    pub simulate_error: &'static str,
    pub chaos: &'static str,
}

const ENDPOINTS: Endpoints = Endpoints {
    health: "/health",
    metrics: "/metrics",
    simulate_error: "/simulate-error",
    chaos: "/chaos/:mode (on|off|slow)",
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub message: &'static str,
    pub status: &'static str,
    pub timestamp: String,
    pub chaos_mode: ChaosMode,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Healthy {
    pub status: &'static str,
    pub timestamp: String,
    pub chaos_mode: ChaosMode,
}

#[derive(Debug, Serialize)]
pub struct Unhealthy {
    pub status: &'static str,
    pub reason: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedError {
    pub error: &'static str,
    pub timestamp: String,
    pub chaos_mode: ChaosMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosChanged {
    pub message: String,
    pub previous_mode: ChaosMode,
    pub timestamp: String,
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "OpsPulse Monitoring Demo",
        status: "healthy",
        timestamp: timestamp(),
        chaos_mode: state.chaos.current(),
        endpoints: ENDPOINTS,
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let mode = state.chaos.current();
    if mode.is_healthy() {
        Json(Healthy {
            status: "healthy",
            timestamp: timestamp(),
            chaos_mode: mode,
        })
        .into_response()
    } else {
        let body = Unhealthy {
            status: "unhealthy",
            reason: "Chaos mode is ON",
            timestamp: timestamp(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// `GET /simulate-error`: always 500, for exercising alert rules.
pub async fn simulate_error(State(state): State<AppState>) -> (StatusCode, Json<SimulatedError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(SimulatedError {
            error: "Simulated error for testing alerts",
            timestamp: timestamp(),
            chaos_mode: state.chaos.current(),
        }),
    )
}

/// `GET /chaos/{mode}`
pub async fn set_chaos(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<ChaosChanged>, ApiError> {
    let transition = state.chaos.set(&mode).inspect_err(|_| {
        tracing::warn!(mode = %mode, "Rejected chaos mode");
    })?;

    Ok(Json(ChaosChanged {
        message: format!("Chaos mode set to: {}", transition.current),
        previous_mode: transition.previous,
        timestamp: timestamp(),
    }))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to render metrics");
        ApiError::MetricsUnavailable
    })?;

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
