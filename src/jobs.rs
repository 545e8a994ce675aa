//! Fire-and-forget work that must not hold up the HTTP response.
//!
//! Jobs run on a [`TaskTracker`] so shutdown can wait for them. A job that
//! panics is caught and logged inside its own task; it never takes the
//! server down and never leaves the tracker waiting.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::metrics;

#[derive(Clone, Default)]
pub struct BackgroundJobs {
    tracker: TaskTracker,
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` in the background. `failure_msg` is logged if it panics.
    pub fn spawn<F>(&self, failure_msg: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match AssertUnwindSafe(job).catch_unwind().await {
                Ok(()) => metrics::record_background_job("completed"),
                Err(panic) => {
                    metrics::record_background_job("panicked");
                    error!(
                        panic = %panic_message(panic.as_ref()),
                        "{failure_msg}"
                    );
                }
            }
        });
    }

    /// Jobs still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting the "all done" state as final and wait for every job,
    /// giving up after `deadline`. Returns whether the drain finished.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for background jobs to finish");
        }

        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.tracker.len(),
                    deadline_secs = deadline.as_secs(),
                    "Background jobs still running at shutdown deadline"
                );
                false
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
