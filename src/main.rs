use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use greenlight::middleware::install_panic_hook;
use greenlight::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration is read first so the log format it selects applies from
    // the first line; a load error is reported once logging is up.
    let config = Config::from_env();
    match &config {
        Ok(c) => init_tracing(&c.log_level, c.log_json),
        Err(_) => init_tracing("info", false),
    }
    install_panic_hook();

    info!(
        "Starting Greenlight API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        env = %config.env,
        rate_limit_enabled = config.rate_limit_enabled,
        "Configuration loaded"
    );

    // Build application state
    let mut state = AppState::in_memory(config.clone());
    if let Some(handle) = metrics::try_init_metrics() {
        state = state.with_metrics(handle);
    }

    state.bootstrap_admin().await.map_err(|e| {
        error!("Failed to bootstrap admin account: {e}");
        exitcode::CONFIG
    })?;

    // Hash the unknown-email decoy up front so the first miss costs the same
    let decoy = state.decoy.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || decoy.warm()).await {
        warn!("Failed to prepare decoy password hash: {e}");
    }

    let app = build_router(state.clone()).map_err(|e| {
        error!("Failed to build router: {e}");
        exitcode::CONFIG
    })?;

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET    /v1/healthcheck          - Health check");
    info!("  GET    /metrics                 - Prometheus metrics");
    info!("  GET    /v1/movies               - List movies");
    info!("  POST   /v1/movies               - Create movie");
    info!("  GET    /v1/movies/{{id}}          - Show movie");
    info!("  PATCH  /v1/movies/{{id}}          - Update movie");
    info!("  DELETE /v1/movies/{{id}}          - Delete movie");
    info!("  POST   /v1/users                - Register user");
    info!("  PUT    /v1/users/{{id}}/activate  - Activate user");
    info!("  POST   /v1/tokens/auth          - Issue bearer token");
    info!("  POST   /v1/tokens/jwt           - Issue JWT");

    // Client addresses feed the per-client rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
