//! Credential exchange endpoints.
//!
//! # Endpoints
//!
//! - `POST /v1/tokens/auth` - Basic credentials for a stateful bearer token
//! - `POST /v1/tokens/jwt` - Basic credentials for a signed JWT
//!
//! Both routes authenticate with the Basic scheme, so the handlers only run
//! for a caller whose email and password matched.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{info, instrument};

use crate::auth::Identity;
use crate::auth::token::{self, TokenScope, TokenView};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Envelope, JwtView, User};
use crate::state::AppState;

fn credential_owner(identity: &Identity) -> AppResult<&User> {
    identity.user().ok_or(AppError::InvalidCredentials)
}

#[instrument(skip(state, identity))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<(StatusCode, Json<Envelope<TokenView>>)> {
    let user = credential_owner(&identity)?;

    let issued = token::generate(
        user.id,
        Config::token_ttl(state.config.auth_token_ttl),
        TokenScope::Authentication,
    );
    state
        .models
        .timed("tokens.insert", state.models.tokens.insert(&issued.record))
        .await?;

    info!(user_id = %user.id, expiry = %issued.record.expiry, "Authentication token issued");
    Ok((StatusCode::CREATED, Json(Envelope::new(TokenView::from(&issued)))))
}

#[instrument(skip(state, identity))]
pub async fn create_jwt(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<(StatusCode, Json<Envelope<JwtView>>)> {
    let user = credential_owner(&identity)?;
    let (token, expiry) = state.jwt.issue(&user.email)?;

    info!(user_id = %user.id, %expiry, "JWT issued");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::new(JwtView { token, expiry })),
    ))
}
