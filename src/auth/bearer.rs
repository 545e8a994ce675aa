//! Opaque bearer tokens issued by `POST /v1/tokens/auth`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::debug;

use super::token::{self, TokenScope};
use super::{CredentialResolver, Identity, authorization};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Models, StoreError};

/// Value of `Authorization: Bearer <value>`, `None` when no header was sent.
///
/// Anything other than exactly two space separated parts with the `Bearer`
/// keyword is rejected.
pub(crate) fn bearer_value(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(header) = authorization(headers)? else {
        return Ok(None);
    };

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(value), None) if !value.is_empty() => Ok(Some(value)),
        _ => Err(AppError::InvalidCredentials),
    }
}

pub struct BearerResolver<'a> {
    models: &'a Models,
}

impl<'a> BearerResolver<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            models: &state.models,
        }
    }
}

#[async_trait]
impl CredentialResolver for BearerResolver<'_> {
    async fn resolve(&self, headers: &HeaderMap) -> AppResult<Identity> {
        let Some(plaintext) = bearer_value(headers)? else {
            return Ok(Identity::Anonymous);
        };

        if !token::is_well_formed(plaintext) {
            return Err(AppError::InvalidCredentials);
        }

        let hash = token::hash_token(plaintext);
        let (user, record) = match self
            .models
            .timed(
                "users.get_for_token",
                self.models.users.get_for_token(TokenScope::Authentication, &hash),
            )
            .await
        {
            Ok(found) => found,
            Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if record.is_expired_at(Utc::now()) {
            debug!(user_id = %user.id, "Rejected expired bearer token");
            return Err(AppError::InvalidCredentials);
        }

        Ok(Identity::from(user))
    }
}
