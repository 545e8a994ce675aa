//! Shared application state for Axum handlers.
//!
//! Everything here is cheap to clone: configuration, signing keys and the
//! mailer sit behind `Arc`, the stores are trait objects behind `Arc`.
//!
//! # Structured Concurrency
//!
//! Two kinds of background work hang off the state:
//!
//! - **Limiter expiry tasks**, one per tracked client address. They run on
//!   `task_tracker` and stop when `cancellation_token` fires.
//! - **Background jobs** (welcome mail). They run on [`BackgroundJobs`] and are
//!   never cancelled; shutdown waits for them up to `SHUTDOWN_TIMEOUT_SECS`.
//!
//! Call `shutdown()` once the HTTP server has stopped accepting requests.

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::auth::JwtKeys;
use crate::auth::password::{DecoyPassword, Password};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::jobs::BackgroundJobs;
use crate::mailer::{LogMailer, Mailer};
use crate::models::User;
use crate::routes::{MOVIES_READ, MOVIES_WRITE};
use crate::store::{Models, StoreError};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Storage capabilities, each call bounded by the query timeout
    pub models: Models,
    /// JWT signing and validation material
    pub jwt: Arc<JwtKeys>,
    /// Hash checked for Basic logins naming an unknown email
    pub decoy: Arc<DecoyPassword>,
    /// Outbound mail transport
    pub mailer: Arc<dyn Mailer>,
    /// Post-response work such as the welcome mail
    pub jobs: BackgroundJobs,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Prometheus handle rendered at `/metrics`, absent in tests
    metrics: Option<PrometheusHandle>,
    /// Tracks limiter expiry tasks
    task_tracker: TaskTracker,
    /// Signals limiter expiry tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, models: Models, mailer: Arc<dyn Mailer>) -> Self {
        let jwt = Arc::new(JwtKeys::from_config(&config));
        let decoy = Arc::new(DecoyPassword::new(config.bcrypt_cost));
        Self {
            config: Arc::new(config),
            models,
            jwt,
            decoy,
            mailer,
            jobs: BackgroundJobs::new(),
            started_at: Instant::now(),
            metrics: None,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// State over a fresh in-memory store with the logging mailer.
    pub fn in_memory(config: Config) -> Self {
        let models = Models::in_memory(config.query_timeout);
        Self::new(config, models, Arc::new(LogMailer))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn metrics_handle(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }

    pub fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Create the configured admin account, activated and allowed to read and
    /// write movies. Does nothing when no admin is configured or the email is
    /// already registered.
    pub async fn bootstrap_admin(&self) -> AppResult<Option<User>> {
        let Some(admin) = self.config.admin.clone() else {
            return Ok(None);
        };

        let cost = self.config.bcrypt_cost;
        let plaintext = admin.password;
        let password = tokio::task::spawn_blocking(move || Password::set(&plaintext, cost))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AppError::ConfigError(format!("ADMIN_PASSWORD: {e}")))?;

        let mut user = User::new(admin.name, admin.email, password);
        user.activated = true;
        match self
            .models
            .timed("users.insert", self.models.users.insert(&mut user))
            .await
        {
            Ok(()) => {}
            Err(StoreError::DuplicateEmail) => {
                info!(email = %user.email, "Admin account already exists");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.models
            .timed(
                "permissions.add_for_user",
                self.models
                    .permissions
                    .add_for_user(user.id, &[MOVIES_READ, MOVIES_WRITE]),
            )
            .await?;

        info!(user_id = %user.id, email = %user.email, "Admin account created");
        Ok(Some(user))
    }

    /// Stop limiter tasks and drain background jobs.
    ///
    /// Returns `false` if jobs were still running when the shutdown deadline
    /// passed.
    pub async fn shutdown(&self) -> bool {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        let drained = self.jobs.shutdown(self.config.shutdown_timeout).await;
        if drained {
            info!("All background tasks have completed");
        } else {
            warn!("Shutdown deadline passed with background jobs outstanding");
        }
        drained
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_stops_tracked_tasks() {
        let state = AppState::in_memory(Config::default());
        let cancel = state.cancellation_token().clone();
        state.task_tracker().spawn(async move {
            cancel.cancelled().await;
        });

        assert!(state.shutdown().await);
        assert!(state.task_tracker().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_jobs() {
        let state = AppState::in_memory(Config {
            shutdown_timeout: Duration::from_secs(1),
            ..Config::default()
        });
        state.jobs.spawn("stuck job failed", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert!(!state.shutdown().await);
    }

    #[tokio::test]
    async fn test_bootstrap_admin() {
        let state = AppState::in_memory(Config {
            bcrypt_cost: 4,
            admin: Some(crate::config::AdminAccount {
                name: "Root".to_string(),
                email: "root@example.com".to_string(),
                password: "pa55word-root".to_string(),
            }),
            ..Config::default()
        });

        let admin = state.bootstrap_admin().await.unwrap().unwrap();
        assert!(admin.activated);
        let perms = state.models.permissions.for_user(admin.id).await.unwrap();
        assert!(perms.includes(MOVIES_READ));
        assert!(perms.includes(MOVIES_WRITE));

        // A second run finds the account and leaves it alone.
        assert!(state.bootstrap_admin().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_without_admin_is_noop() {
        let state = AppState::in_memory(Config::default());
        assert!(state.bootstrap_admin().await.unwrap().is_none());
    }

    #[test]
    fn test_clone_shares_config() {
        let state = AppState::in_memory(Config::default());
        let clone = state.clone();
        assert!(Arc::ptr_eq(&state.config, &clone.config));
        assert!(clone.metrics_handle().is_none());
    }
}
