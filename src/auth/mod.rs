//! Authentication: credential schemes, identities and authorization gates.
//!
//! # Schemes
//!
//! | Scheme   | Header                         | Missing header | Used by                  |
//! |----------|--------------------------------|----------------|--------------------------|
//! | Basic    | `Authorization: Basic <b64>`   | 401            | token issuance           |
//! | Bearer   | `Authorization: Bearer <token>`| anonymous      | users, movies            |
//! | JWT      | `Authorization: Bearer <jwt>`  | anonymous      | healthcheck, movies      |
//!
//! Each scheme has its own resolver. Routes pick one through [`AuthScheme`];
//! `BearerOrJwt` looks at the presented credential and hands it to exactly
//! one of the two resolvers.

pub mod authorize;
pub mod basic;
pub mod bearer;
pub mod jwt;
pub mod password;
pub mod token;

use std::fmt;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::User;
use crate::state::AppState;

pub use authorize::{require_activated, require_permission};
pub use basic::BasicResolver;
pub use bearer::BearerResolver;
pub use jwt::{JwtKeys, JwtResolver};

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(Box<User>),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity::User(Box::new(user))
    }
}

/// Handlers read the identity the authentication stage attached.
///
/// A route without an authentication stage has no identity; asking for one
/// there is a wiring mistake and answers 500 instead of panicking.
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or_else(|| {
            AppError::Internal(format!(
                "no identity attached to {} {}",
                parts.method,
                parts.uri.path()
            ))
        })
    }
}

/// Credential scheme selected per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Bearer,
    Jwt,
    BearerOrJwt,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthScheme::Basic => "basic",
            AuthScheme::Bearer => "bearer",
            AuthScheme::Jwt => "jwt",
            AuthScheme::BearerOrJwt => "bearer_or_jwt",
        })
    }
}

/// One way of turning request headers into an [`Identity`].
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> AppResult<Identity>;
}

/// Resolve the caller with the route's scheme.
pub async fn authenticate(
    state: &AppState,
    scheme: AuthScheme,
    headers: &HeaderMap,
) -> AppResult<Identity> {
    let scheme = match scheme {
        AuthScheme::BearerOrJwt => {
            if bearer::bearer_value(headers)?.is_some_and(jwt::looks_like_jwt) {
                AuthScheme::Jwt
            } else {
                AuthScheme::Bearer
            }
        }
        other => other,
    };

    let result = match scheme {
        AuthScheme::Basic => BasicResolver::new(state).resolve(headers).await,
        AuthScheme::Jwt => JwtResolver::new(state).resolve(headers).await,
        AuthScheme::Bearer | AuthScheme::BearerOrJwt => {
            BearerResolver::new(state).resolve(headers).await
        }
    };

    if let Err(e) = &result
        && !matches!(e, AppError::Internal(_) | AppError::OperationTimeout(_))
    {
        metrics::record_auth_failure(scheme);
    }
    result
}

/// Raw `Authorization` header, `None` when absent or blank.
pub(crate) fn authorization(headers: &HeaderMap) -> AppResult<Option<&str>> {
    match headers.get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => {
            let value = value.to_str().map_err(|_| AppError::InvalidCredentials)?;
            if value.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(value))
            }
        }
    }
}
