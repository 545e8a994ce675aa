//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//! `JWT_SECRET` is the only required value.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET`: HS256 signing key for issued JWTs
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*` for dev)
//! - `TRUSTED_PROXIES`: CIDR ranges allowed to supply `X-Forwarded-For`
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_ENABLED`: Turn the two-tier limiter on (default: false)
//! - `GLOBAL_RATE_LIMIT`: Requests per second across all clients (default: 100)
//! - `PER_CLIENT_RATE_LIMIT`: Requests per second per client address (default: 100)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Longest lifetime accepted for any issued token or JWT.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Deployment environment reported by the healthcheck (default: "development")
    pub env: String,

    /// Maximum request body size in bytes (default: 1 MiB)
    pub max_request_body_size: usize,

    /// Deadline for draining background jobs on shutdown (default: 20 seconds)
    pub shutdown_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Whether the two-tier rate limiter is installed (default: false)
    pub rate_limit_enabled: bool,

    /// Requests per second shared by all clients (default: 100)
    pub global_rate_limit: u32,

    /// Requests per second per client address (default: 100)
    pub per_client_rate_limit: u32,

    /// Idle window after which a client's bucket is dropped (default: 30 seconds)
    pub client_idle_timeout: Duration,

    /// Trusted proxy CIDR ranges. Forwarding headers are honored only when
    /// the TCP peer falls inside one of these networks.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (the peer address is always used)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// HS256 key used to sign and verify JWTs
    pub jwt_secret: String,

    /// `iss` claim written and required (default: "greenlight.example.com")
    pub jwt_issuer: String,

    /// `aud` claim written and required (default: "greenlight.example.com")
    pub jwt_audience: String,

    /// Lifetime of issued JWTs (default: 3 days)
    pub jwt_ttl: Duration,

    /// Lifetime of opaque bearer tokens (default: 24 hours)
    pub auth_token_ttl: Duration,

    /// Lifetime of activation tokens (default: 3 days)
    pub activation_token_ttl: Duration,

    /// bcrypt work factor for stored passwords (default: 12)
    pub bcrypt_cost: u32,

    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins
    pub cors_allowed_origins: Vec<String>,

    /// Optional account created at startup with read and write grants
    pub admin: Option<AdminAccount>,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Deadline applied to each individual store call (default: 3 seconds)
    pub query_timeout: Duration,

    // =========================================================================
    // Mail Configuration
    // =========================================================================
    /// From address on outgoing mail
    pub smtp_sender: String,

    /// Delivery attempts for the welcome email (default: 3)
    pub mail_retry_attempts: u32,

    /// Fixed delay between delivery attempts (default: 500ms)
    pub mail_retry_delay: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Emit JSON log lines instead of the human format
    pub log_json: bool,
}

/// Credentials for the bootstrap account.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any required configuration is missing
    /// or invalid (e.g., non-numeric PORT value, empty JWT_SECRET).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1_048_576)?,
            shutdown_timeout: Duration::from_secs(Self::parse_env("SHUTDOWN_TIMEOUT_SECS", 20)?),

            // Rate limiting
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", false)?,
            global_rate_limit: Self::parse_env("GLOBAL_RATE_LIMIT", 100)?,
            per_client_rate_limit: Self::parse_env("PER_CLIENT_RATE_LIMIT", 100)?,
            client_idle_timeout: Duration::from_secs(Self::parse_env(
                "CLIENT_IDLE_TIMEOUT_SECS",
                30,
            )?),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Authentication
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            jwt_issuer: env::var("JWT_ISSUER")
                .unwrap_or_else(|_| "greenlight.example.com".to_string()),
            jwt_audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "greenlight.example.com".to_string()),
            jwt_ttl: Duration::from_secs(Self::parse_env("JWT_TTL_SECS", 3 * 24 * 3600)?),
            auth_token_ttl: Duration::from_secs(Self::parse_env("AUTH_TOKEN_TTL_SECS", 24 * 3600)?),
            activation_token_ttl: Duration::from_secs(Self::parse_env(
                "ACTIVATION_TOKEN_TTL_SECS",
                3 * 24 * 3600,
            )?),
            bcrypt_cost: Self::parse_env("BCRYPT_COST", 12)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),
            admin: Self::parse_admin(),

            // Storage
            query_timeout: Duration::from_secs(Self::parse_env("QUERY_TIMEOUT_SECS", 3)?),

            // Mail
            smtp_sender: env::var("SMTP_SENDER").unwrap_or_else(|_| {
                "Greenlight <no-reply@greenlight.example.com>".to_string()
            }),
            mail_retry_attempts: Self::parse_env("MAIL_RETRY_ATTEMPTS", 3)?,
            mail_retry_delay: Duration::from_millis(Self::parse_env("MAIL_RETRY_DELAY_MS", 500)?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(AppError::ConfigError(
                "JWT_SECRET must be set".to_string(),
            ));
        }

        if self.rate_limit_enabled && (self.global_rate_limit == 0 || self.per_client_rate_limit == 0)
        {
            return Err(AppError::ConfigError(
                "GLOBAL_RATE_LIMIT and PER_CLIENT_RATE_LIMIT must be greater than 0 when RATE_LIMIT_ENABLED"
                    .to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(AppError::ConfigError(format!(
                "BCRYPT_COST must be between 4 and 31 (got {})",
                self.bcrypt_cost
            )));
        }

        if self.mail_retry_attempts == 0 {
            return Err(AppError::ConfigError(
                "MAIL_RETRY_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "QUERY_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.client_idle_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "CLIENT_IDLE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        for (name, ttl) in [
            ("JWT_TTL_SECS", self.jwt_ttl),
            ("AUTH_TOKEN_TTL_SECS", self.auth_token_ttl),
            ("ACTIVATION_TOKEN_TTL_SECS", self.activation_token_ttl),
        ] {
            if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
                return Err(AppError::ConfigError(format!(
                    "{name} must be between 1 and {} seconds",
                    MAX_TOKEN_TTL.as_secs()
                )));
            }
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Burst capacity for a rate: the rate plus ten percent.
    pub fn burst_for(rate: u32) -> u32 {
        rate.saturating_add(rate / 10)
    }

    /// Token lifetime as a calendar duration, capped at [`MAX_TOKEN_TTL`].
    pub fn token_ttl(ttl: Duration) -> chrono::Duration {
        chrono::Duration::from_std(ttl.min(MAX_TOKEN_TTL))
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list from an environment variable.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Bootstrap account is configured only when both email and password are set.
    fn parse_admin() -> Option<AdminAccount> {
        let email = env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty())?;
        let password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty())?;
        Some(AdminAccount {
            name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
            email,
            password,
        })
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            env: "development".to_string(),
            max_request_body_size: 1_048_576,
            shutdown_timeout: Duration::from_secs(20),
            // Rate limiting
            rate_limit_enabled: false,
            global_rate_limit: 100,
            per_client_rate_limit: 100,
            client_idle_timeout: Duration::from_secs(30),
            trusted_proxies: vec![],
            // Authentication
            jwt_secret: "development-only-secret-change-me".to_string(),
            jwt_issuer: "greenlight.example.com".to_string(),
            jwt_audience: "greenlight.example.com".to_string(),
            jwt_ttl: Duration::from_secs(3 * 24 * 3600),
            auth_token_ttl: Duration::from_secs(24 * 3600),
            activation_token_ttl: Duration::from_secs(3 * 24 * 3600),
            bcrypt_cost: 12,
            cors_allowed_origins: vec!["*".to_string()],
            admin: None,
            // Storage
            query_timeout: Duration::from_secs(3),
            // Mail
            smtp_sender: "Greenlight <no-reply@greenlight.example.com>".to_string(),
            mail_retry_attempts: 3,
            mail_retry_delay: Duration::from_millis(500),
            // Observability
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}
