//! # Greenlight
//!
//! A movie catalog REST API built on Axum. Most of the interesting work
//! happens before a handler runs: every request passes a layered admission
//! chain that decides whether it is served.
//!
//! - **Resilience**: a panic in any layer becomes a 500, never a crashed process
//! - **Admission**: global and per-client token buckets with idle eviction
//! - **Authentication**: Basic, stateful bearer tokens and signed JWTs
//! - **Authorization**: activation gate and per-route permission codes
//! - **Observability**: request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layers (Panic Recovery → Rate Limit → Request ID → Trace)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Route pipelines (Authenticate → Activated → Permission)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, movies, users, tokens)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Models (deadline-bound store capabilities)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use greenlight::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), greenlight::AppError> {
//!     let config = Config::from_env()?;
//!     let state = AppState::in_memory(config);
//!     let app = build_router(state)?;
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     Ok(())
//! }
//! ```
//!
//! ## Rate Limiting
//!
//! ```bash
//! RATE_LIMIT_ENABLED=true GLOBAL_RATE_LIMIT=100 PER_CLIENT_RATE_LIMIT=10 cargo run
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
