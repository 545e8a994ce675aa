//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Panic Recovery   │ ← 500 + Connection: close on panic
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if either tier is exhausted
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Request ID/Trace │ ← x-request-id, HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Route pipeline   │ ← authenticate → activated → permission
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/v1/healthcheck`, `/metrics` - Health & monitoring
//! - `/v1/movies` - Catalog, Bearer or JWT plus `movies:*` permission
//! - `/v1/users` - Registration, activation and account management
//! - `/v1/tokens` - Basic credentials exchanged for a token or JWT

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method, header};
use axum::routing::{MethodRouter, delete, get, patch, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthScheme;
use crate::error::{AppError, AppResult};
use crate::handlers;
use crate::middleware::{PanicRecoveryLayer, Pipeline, RateLimitLayer, track_metrics};
use crate::state::AppState;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Route pipelines, one per access policy.
struct Guards<'a> {
    state: &'a AppState,
    movies_read: Pipeline,
    movies_write: Pipeline,
    account: Pipeline,
    credentials: Pipeline,
    health: Pipeline,
}

impl<'a> Guards<'a> {
    fn new(state: &'a AppState) -> Self {
        let movies = |code: &'static str| {
            Pipeline::new()
                .authenticate(AuthScheme::BearerOrJwt)
                .require_activated()
                .require_permission(code)
        };
        Self {
            state,
            movies_read: movies(MOVIES_READ),
            movies_write: movies(MOVIES_WRITE),
            account: Pipeline::new()
                .authenticate(AuthScheme::Bearer)
                .require_activated(),
            credentials: Pipeline::new().authenticate(AuthScheme::Basic),
            health: Pipeline::new().authenticate(AuthScheme::Jwt),
        }
    }

    fn guard(
        &self,
        pipeline: &Pipeline,
        route: MethodRouter<AppState>,
    ) -> AppResult<MethodRouter<AppState>> {
        pipeline
            .clone()
            .apply(route, self.state)
            .map_err(|e| AppError::ConfigError(e.to_string()))
    }
}

/// Build the application router with all routes and middleware configured.
///
/// # Errors
///
/// Returns `ConfigError` if the rate limiter configuration or a route
/// pipeline is invalid.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let config = state.config.clone();
    let g = Guards::new(&state);

    let router = Router::new()
        // Health and monitoring
        .route(
            "/v1/healthcheck",
            g.guard(&g.health, get(handlers::healthcheck))?,
        )
        .route("/metrics", get(handlers::metrics))
        // Movies
        .route(
            "/v1/movies",
            g.guard(&g.movies_read, get(handlers::list_movies))?
                .merge(g.guard(&g.movies_write, post(handlers::create_movie))?),
        )
        .route(
            "/v1/movies/{id}",
            g.guard(&g.movies_read, get(handlers::show_movie))?
                .merge(g.guard(
                    &g.movies_write,
                    patch(handlers::update_movie).delete(handlers::delete_movie),
                )?),
        )
        // Users
        .route(
            "/v1/users",
            post(handlers::register_user)
                .merge(g.guard(&g.account, get(handlers::list_users))?),
        )
        .route(
            "/v1/users/{id}",
            g.guard(&g.account, delete(handlers::delete_user))?,
        )
        .route("/v1/users/{id}/activate", put(handlers::activate_user))
        // Tokens
        .route(
            "/v1/tokens/auth",
            g.guard(&g.credentials, post(handlers::create_authentication_token))?,
        )
        .route(
            "/v1/tokens/jwt",
            g.guard(&g.credentials, post(handlers::create_jwt))?,
        )
        .route_layer(axum::middleware::from_fn(track_metrics))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found);

    // =========================================================================
    // Apply Middleware Stack (order matters - last layer runs first)
    // =========================================================================

    // 1. Request body size limit
    let mut router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. CORS
    router = router.layer(build_cors_layer(&config.cors_allowed_origins));

    // 3. Tracing and request IDs
    router = router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    // 4. Rate limiting
    let rate_limit =
        RateLimitLayer::from_state(&state).map_err(|e| AppError::ConfigError(e.to_string()))?;
    if rate_limit.is_enabled() {
        info!(
            global_rps = config.global_rate_limit,
            per_client_rps = config.per_client_rate_limit,
            idle_timeout_secs = config.client_idle_timeout.as_secs(),
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_ENABLED=false)");
    }
    router = router.layer(rate_limit);

    // 5. Panic recovery wraps everything
    router = router.layer(PanicRecoveryLayer::new());

    Ok(router.with_state(state))
}

/// Build CORS layer from configuration.
///
/// `*` allows any origin; anything else is parsed as an explicit origin list.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
        Method::HEAD,
    ];
    let headers: [HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

    let layer = CorsLayer::new().allow_methods(methods).allow_headers(headers);
    if allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}
