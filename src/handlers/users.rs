//! Account endpoints.
//!
//! # Endpoints
//!
//! - `POST   /v1/users` - Register; sends the activation token by mail
//! - `PUT    /v1/users/{id}/activate` - Activate with that token
//! - `GET    /v1/users` - List accounts (bearer, activated)
//! - `DELETE /v1/users/{id}` - Delete an account (bearer, activated)

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderName, StatusCode};
use chrono::Utc;
use tracing::{debug, info, instrument};

use super::extract::{JsonBody, QueryParams, user_id};
use crate::auth::password::Password;
use crate::auth::token::{self, TOKEN_LENGTH, TokenRecord, TokenScope};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::mailer::{WelcomeEmail, deliver_with_retry};
use crate::models::user::USER_SORT_SAFELIST;
use crate::models::{
    ActivateUserRequest, Envelope, Filters, Metadata, Page, RegisterUserRequest, User, UserFilter,
    UserQuery,
};
use crate::state::AppState;
use crate::validation::Validator;

/// Permission every new account starts with.
pub const DEFAULT_PERMISSION: &str = "movies:read";

/// Register an account.
///
/// The account starts inactive with `movies:read`. The welcome mail is sent
/// in the background; the response does not wait for it.
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> AppResult<(StatusCode, [(HeaderName, String); 1], Json<Envelope<User>>)> {
    let mut v = Validator::new();
    payload.validate(&mut v);
    v.finish()?;

    let cost = state.config.bcrypt_cost;
    let RegisterUserRequest {
        name,
        email,
        password,
    } = payload;
    let password = tokio::task::spawn_blocking(move || Password::set(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut user = User::new(name, email, password);
    state
        .models
        .timed("users.insert", state.models.users.insert(&mut user))
        .await?;
    state
        .models
        .timed(
            "permissions.add_for_user",
            state
                .models
                .permissions
                .add_for_user(user.id, &[DEFAULT_PERMISSION]),
        )
        .await?;

    let issued = token::generate(
        user.id,
        Config::token_ttl(state.config.activation_token_ttl),
        TokenScope::Activation,
    );
    state
        .models
        .timed("tokens.insert", state.models.tokens.insert(&issued.record))
        .await?;

    let message = WelcomeEmail {
        name: &user.name,
        user_id: user.id,
        activation_token: &issued.plaintext,
    }
    .render(&state.config.smtp_sender, &user.email);
    let mailer = state.mailer.clone();
    let attempts = state.config.mail_retry_attempts;
    let delay = state.config.mail_retry_delay;
    let id = user.id;
    state.jobs.spawn("welcome email job failed", async move {
        if deliver_with_retry(mailer, message, attempts, delay)
            .await
            .is_err()
        {
            debug!(user_id = %id, "Welcome email abandoned");
        }
    });

    info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::ACCEPTED,
        [(LOCATION, format!("/v1/users/{}", user.id))],
        Json(Envelope::new(user)),
    ))
}

/// Activate an account with the plaintext token from the welcome mail.
///
/// The token must belong to the account in the path, carry the activation
/// scope and be unexpired. All of the account's activation tokens are
/// deleted once it is activated.
#[instrument(skip(state, payload))]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<ActivateUserRequest>,
) -> AppResult<Json<Envelope<User>>> {
    let mut v = Validator::new();
    v.check(!payload.token.is_empty(), "token", "must be provided");
    v.check(
        payload.token.is_empty() || payload.token.len() == TOKEN_LENGTH,
        "token",
        "must be 22 bytes long",
    );
    v.finish()?;

    let id = user_id(&id)?;
    let mut user = state
        .models
        .timed("users.get_by_id", state.models.users.get_by_id(id))
        .await?;

    let now = Utc::now();
    let live: Vec<TokenRecord> = state
        .models
        .timed(
            "tokens.for_user",
            state.models.tokens.for_user(user.id, TokenScope::Activation),
        )
        .await?
        .into_iter()
        .filter(|record| !record.is_expired_at(now))
        .collect();
    if !token::is_well_formed(&payload.token) || token::match_token(&live, &payload.token).is_none()
    {
        return Err(AppError::InvalidActivationToken);
    }

    user.activated = true;
    state
        .models
        .timed("users.update", state.models.users.update(&mut user))
        .await?;
    state
        .models
        .timed(
            "tokens.delete_all_for_user",
            state
                .models
                .tokens
                .delete_all_for_user(user.id, TokenScope::Activation),
        )
        .await?;

    info!(user_id = %user.id, "User activated");
    Ok(Json(Envelope::new(user)))
}

/// List accounts.
///
/// # Query Parameters
///
/// - `name`, `email`: case-insensitive substring matches
/// - `page` (default 1), `page_size` (default 20)
/// - `sort`: `id`, `name`, `email`, `created_at`, optionally prefixed with `-`
#[instrument(skip(state, qs))]
pub async fn list_users(
    State(state): State<AppState>,
    qs: QueryParams,
) -> AppResult<Json<Page<User>>> {
    let mut v = Validator::new();
    let filter = UserFilter {
        name: qs.string("name", ""),
        email: qs.string("email", ""),
    };
    let filters = Filters::new(
        qs.int("page", 1, &mut v),
        qs.int("page_size", 20, &mut v),
        qs.string("sort", "id"),
        USER_SORT_SAFELIST,
    );
    filters.validate(&mut v);
    v.finish()?;

    let query = UserQuery {
        filter,
        filters: filters.clone(),
    };
    let (users, total) = state
        .models
        .timed("users.list", state.models.users.list(&query))
        .await?;

    Ok(Json(Page {
        metadata: Metadata::calculate(total, filters.page, filters.page_size),
        result: users,
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<&'static str>>> {
    let id = user_id(&id)?;
    state
        .models
        .timed("users.delete", state.models.users.delete(id))
        .await?;

    info!(user_id = %id, "User deleted");
    Ok(Json(Envelope::new("user deleted successfully")))
}
