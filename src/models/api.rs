//! Response envelopes shared by all endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::filters::Metadata;

/// Success envelope: `{"result": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub result: T,
}

impl<T> Envelope<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}

/// Paginated listing: `{"metadata": ..., "result": [...]}`.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub metadata: Metadata,
    pub result: Vec<T>,
}

/// `GET /v1/healthcheck` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub health: HealthStatus,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub environment: String,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Email of the JWT bearer, when one was presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

/// `POST /v1/tokens/jwt` body.
#[derive(Debug, Serialize)]
pub struct JwtView {
    pub token: String,
    pub expiry: DateTime<Utc>,
}
