//! Prometheus metrics for application observability.
//!
//! The recorder is installed once at startup and rendered by the
//! `GET /metrics` handler on the main listener.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `greenlight_http_requests_total` - Requests served (labels: method, path, status)
//! - `greenlight_rate_limit_rejections_total` - Requests refused by the limiter (label: tier)
//! - `greenlight_background_jobs_total` - Finished background jobs (label: outcome)
//! - `greenlight_auth_failures_total` - Rejected credentials (label: scheme)
//!
//! ## Histograms
//! - `greenlight_http_request_duration_seconds` - Request duration (labels: method, path)
//!
//! ## Gauges
//! - `greenlight_rate_limit_clients` - Client addresses currently tracked by the limiter
//! - `greenlight_app_info` - Always 1 (label: version)

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};

use crate::auth::AuthScheme;

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "greenlight_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "greenlight_http_request_duration_seconds";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "greenlight_rate_limit_rejections_total";
    pub const RATE_LIMIT_CLIENTS: &str = "greenlight_rate_limit_clients";
    pub const BACKGROUND_JOBS_TOTAL: &str = "greenlight_background_jobs_total";
    pub const AUTH_FAILURES_TOTAL: &str = "greenlight_auth_failures_total";
    pub const APP_INFO: &str = "greenlight_app_info";
}

/// Install the Prometheus recorder and describe all metrics.
///
/// # Errors
///
/// Fails if a global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;

    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total number of HTTP requests served");
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Requests rejected by the global or per-client rate limiter"
    );
    describe_counter!(
        names::BACKGROUND_JOBS_TOTAL,
        "Background jobs finished, by outcome"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Requests whose credentials were rejected, by scheme"
    );

    describe_histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_CLIENTS,
        "Client addresses currently tracked by the per-client limiter"
    );
    describe_gauge!(names::APP_INFO, "Build information");

    gauge!(names::APP_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "Failed to initialize metrics, continuing without metrics");
            None
        }
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_request(method: &str, path: &str, status: u16) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// `tier` is `global` or `client`.
pub fn record_rate_limit_rejection(tier: &'static str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "tier" => tier).increment(1);
}

/// `outcome` is `completed` or `panicked`.
pub fn record_background_job(outcome: &'static str) {
    counter!(names::BACKGROUND_JOBS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_auth_failure(scheme: AuthScheme) {
    counter!(names::AUTH_FAILURES_TOTAL, "scheme" => scheme.to_string()).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

pub fn record_request_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_rate_limit_clients(count: usize) {
    gauge!(names::RATE_LIMIT_CLIENTS).set(count as f64);
}
