//! Errors surfaced at the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::chaos::{state::VALID_MODES, ChaosError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown token on `/chaos/{mode}`.
    #[error(transparent)]
    InvalidChaosMode(#[from] ChaosError),

    /// Rendering the registry failed. The cause is logged, not returned.
    #[error("failed to collect metrics")]
    MetricsUnavailable,

    #[error("not found")]
    NotFound,

    /// A handler panicked.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidChaosMode(_) => StatusCode::BAD_REQUEST,
            ApiError::MetricsUnavailable | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::InvalidChaosMode(_) => json!({
                "error": "Invalid chaos mode. Use: on, off, or slow",
                "validModes": VALID_MODES,
            }),
            ApiError::MetricsUnavailable => json!({ "error": "Failed to collect metrics" }),
            ApiError::NotFound => json!({ "error": "Not Found" }),
            ApiError::Internal => json!({ "error": "Internal Server Error" }),
        };
        (self.status(), Json(body)).into_response()
    }
}
