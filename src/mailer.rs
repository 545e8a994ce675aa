//! Outbound mail.
//!
//! The transport is a capability: [`Mailer::send`] is synchronous and returns
//! an error, the way an SMTP client would. [`LogMailer`] is the default and
//! writes each message to the log instead of a socket.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail task failed: {0}")]
    Task(String),
}

/// A fully rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "Mail delivered to log"
        );
        debug!(body = %message.plain_body, "Mail body");
        Ok(())
    }
}

/// Welcome mail sent after registration, carrying the activation token.
#[derive(Debug, Clone)]
pub struct WelcomeEmail<'a> {
    pub name: &'a str,
    pub user_id: Uuid,
    pub activation_token: &'a str,
}

impl WelcomeEmail<'_> {
    pub fn render(&self, from: &str, to: &str) -> MailMessage {
        let plain_body = format!(
            "Hi {name},\n\n\
             Thanks for signing up for a Greenlight account. We're excited to have you on board!\n\n\
             For future reference, your user ID number is {id}.\n\n\
             Please send a request to the `PUT /v1/users/{id}/activate` endpoint with the \
             following JSON body to activate your account:\n\n\
             {{\"token\": \"{token}\"}}\n\n\
             Please note that this is a one-time use token and it will expire in 3 days.\n\n\
             Thanks,\n\nThe Greenlight Team\n",
            name = self.name,
            id = self.user_id,
            token = self.activation_token,
        );
        let html_body = format!(
            "<!doctype html>\n<html>\n<head>\n\
             <meta name=\"viewport\" content=\"width=device-width\" />\n\
             <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n\
             </head>\n<body>\n\
             <p>Hi {name},</p>\n\
             <p>Thanks for signing up for a Greenlight account. We're excited to have you on board!</p>\n\
             <p>For future reference, your user ID number is {id}.</p>\n\
             <p>Please send a request to the <code>PUT /v1/users/{id}/activate</code> endpoint \
             with the following JSON body to activate your account:</p>\n\
             <pre><code>{{\"token\": \"{token}\"}}</code></pre>\n\
             <p>Please note that this is a one-time use token and it will expire in 3 days.</p>\n\
             <p>Thanks,</p>\n<p>The Greenlight Team</p>\n\
             </body>\n</html>\n",
            name = self.name,
            id = self.user_id,
            token = self.activation_token,
        );

        MailMessage {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Welcome to Greenlight!".to_string(),
            plain_body,
            html_body,
        }
    }
}

/// Try `attempts` times with a fixed `delay` between tries.
///
/// Each send runs on the blocking pool. After the last failure the error is
/// logged and returned; callers in background jobs just drop it.
pub async fn deliver_with_retry(
    mailer: Arc<dyn Mailer>,
    message: MailMessage,
    attempts: u32,
    delay: Duration,
) -> Result<u32, MailError> {
    let message = Arc::new(message);
    let mut last_error = MailError::Transport("no attempt made".to_string());

    for attempt in 1..=attempts {
        let mailer = mailer.clone();
        let msg = message.clone();
        let outcome = tokio::task::spawn_blocking(move || mailer.send(&msg))
            .await
            .map_err(|e| MailError::Task(e.to_string()))
            .and_then(|r| r);

        match outcome {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                warn!(attempt, attempts, to = %message.to, error = %e, "Mail send failed");
                last_error = e;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    warn!(to = %message.to, attempts, "Giving up on mail delivery");
    Err(last_error)
}
