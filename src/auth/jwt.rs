//! Signed JWTs issued by `POST /v1/tokens/jwt`.
//!
//! Tokens are HS256 with the server-held secret. Nothing is stored: a token
//! is trusted when its signature verifies and its registered claims (issuer,
//! audience, expiry, not-before) hold. The `email` claim then names the user.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::bearer::bearer_value;
use super::{CredentialResolver, Identity};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Models, StoreError};
use crate::validation::is_email;

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
    pub email: String,
}

impl Claims {
    /// Custom claim check run after signature and registered claims pass.
    pub fn validate(&self) -> bool {
        is_email(&self.email) && self.sub == self.email
    }
}

/// Signing material and validation rules, built once from [`Config`].
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn from_config(config: &Config) -> Self {
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECS;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            ttl: Config::token_ttl(config.jwt_ttl),
        }
    }

    /// Sign a token for `email`, returning it with its expiry.
    pub fn issue(&self, email: &str) -> AppResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expiry = now + self.ttl;
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: email.to_string(),
            aud: vec![self.audience.clone()],
            exp: expiry.timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        self.sign(&claims).map(|token| (token, expiry))
    }

    pub fn sign(&self, claims: &Claims) -> AppResult<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("JWT signing failed: {e}")))
    }

    /// Verify signature and registered claims, then the custom claim.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AppError::InvalidJwtSignature,
                other => {
                    debug!(reason = ?other, "Rejected JWT");
                    AppError::InvalidCredentials
                }
            })?;

        if !data.claims.validate() {
            return Err(AppError::InvalidCredentials);
        }
        Ok(data.claims)
    }
}

/// A compact JWS has three dot separated segments; opaque tokens have none.
pub(crate) fn looks_like_jwt(value: &str) -> bool {
    value.split('.').count() == 3
}

pub struct JwtResolver<'a> {
    models: &'a Models,
    keys: &'a JwtKeys,
}

impl<'a> JwtResolver<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            models: &state.models,
            keys: &state.jwt,
        }
    }
}

#[async_trait]
impl CredentialResolver for JwtResolver<'_> {
    async fn resolve(&self, headers: &HeaderMap) -> AppResult<Identity> {
        let Some(token) = bearer_value(headers)? else {
            return Ok(Identity::Anonymous);
        };

        let claims = self.keys.verify(token)?;

        match self
            .models
            .timed("users.get_by_email", self.models.users.get_by_email(&claims.email))
            .await
        {
            Ok(user) => Ok(Identity::from(user)),
            Err(StoreError::NotFound) => Err(AppError::InvalidCredentials),
            Err(e) => Err(e.into()),
        }
    }
}
