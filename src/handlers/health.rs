//! Health and metrics endpoints.
//!
//! # Endpoints
//!
//! - `GET /v1/healthcheck` - Service status; a JWT is optional
//! - `GET /metrics` - Prometheus exposition, unauthenticated

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use crate::auth::Identity;
use crate::models::{HealthResponse, HealthStatus};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "health": {
///     "status": "available",
///     "environment": "development",
///     "version": "0.1.0",
///     "uptime_seconds": 42
///   }
/// }
/// ```
#[instrument(skip(state, identity))]
pub async fn healthcheck(State(state): State<AppState>, identity: Identity) -> Json<HealthResponse> {
    Json(HealthResponse {
        health: HealthStatus {
            status: "available",
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: state.uptime_seconds(),
            caller: identity.user().map(|u| u.email.clone()),
        },
    })
}

/// Prometheus text exposition. 503 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics_handle() {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
