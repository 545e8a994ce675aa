//! HTTP Basic credentials, exchanged once for a bearer token or JWT.
//!
//! Every way this can fail short of an internal error (bad header, bad email
//! shape, unknown email, wrong password) answers the same 401 so a caller
//! cannot tell which accounts exist. An unknown email still pays for a
//! bcrypt verification against a decoy hash, so response time does not
//! give the account away either.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::password::DecoyPassword;
use super::{CredentialResolver, Identity, authorization};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::state::AppState;
use crate::store::{Models, StoreError};
use crate::validation::{Validator, validate_email, validate_password_plaintext};

/// Decoded `email:password` pair.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BasicCredentials {
    pub email: String,
    pub password: String,
}

/// Parse `Authorization: Basic <base64(email:password)>`.
pub(crate) fn basic_credentials(headers: &HeaderMap) -> AppResult<BasicCredentials> {
    let header = authorization(headers)?.ok_or(AppError::InvalidCredentials)?;
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(AppError::InvalidCredentials)?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AppError::InvalidCredentials)?;
    let (email, password) = decoded
        .split_once(':')
        .ok_or(AppError::InvalidCredentials)?;

    Ok(BasicCredentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

pub struct BasicResolver<'a> {
    models: &'a Models,
    decoy: Arc<DecoyPassword>,
}

impl<'a> BasicResolver<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            models: &state.models,
            decoy: Arc::clone(&state.decoy),
        }
    }

    /// The account whose email and password were presented.
    pub async fn user(&self, headers: &HeaderMap) -> AppResult<User> {
        let credentials = basic_credentials(headers)?;

        let mut v = Validator::new();
        validate_email(&mut v, &credentials.email);
        validate_password_plaintext(&mut v, &credentials.password);
        if !v.valid() {
            return Err(AppError::InvalidCredentials);
        }

        let user = match self
            .models
            .timed(
                "users.get_by_email",
                self.models.users.get_by_email(&credentials.email),
            )
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                let decoy = Arc::clone(&self.decoy);
                let candidate = credentials.password;
                tokio::task::spawn_blocking(move || decoy.verify(&candidate))
                    .await
                    .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?;
                debug!("Basic credentials for unknown email");
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        // bcrypt is CPU bound, run it on the blocking pool
        let password = user.password.clone();
        let candidate = credentials.password;
        let matches = tokio::task::spawn_blocking(move || password.matches(&candidate))
            .await
            .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if !matches {
            debug!(user_id = %user.id, "Basic credentials with wrong password");
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }
}

#[async_trait]
impl CredentialResolver for BasicResolver<'_> {
    async fn resolve(&self, headers: &HeaderMap) -> AppResult<Identity> {
        self.user(headers).await.map(Identity::from)
    }
}
