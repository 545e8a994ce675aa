//! Per-request HTTP metrics.
//!
//! Installed with `Router::route_layer` so only matched routes are recorded
//! and the `path` label is the route template (`/v1/movies/{id}`), never the
//! raw URI. That keeps label cardinality bounded.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::metrics;

pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    metrics::record_request(&method, &path, response.status().as_u16());
    metrics::record_request_duration(&method, &path, start.elapsed().as_secs_f64());
    response
}
