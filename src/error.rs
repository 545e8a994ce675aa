use std::collections::BTreeMap;

use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Field name to message map carried by validation failures.
pub type FieldErrors = BTreeMap<String, String>;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Authentication Errors
///
/// Authentication failures are deliberately coarse. A missing user, a wrong
/// password and an unknown token all surface as `InvalidCredentials` so a
/// caller cannot tell which factor failed. Only a bad JWT signature has its
/// own message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0:?}")]
    FailedValidation(FieldErrors),

    #[error("Resource not found")]
    NotFound,

    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("Edit conflict")]
    EditConflict,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("Invalid JWT signature")]
    InvalidJwtSignature,

    #[error("Invalid or expired activation token")]
    InvalidActivationToken,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Account is not activated")]
    InactiveAccount,

    #[error("Missing permission")]
    NotPermitted,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),
}

impl AppError {
    /// Build a single-field validation failure.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AppError::FailedValidation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCredentials
            | AppError::InvalidJwtSignature
            | AppError::InvalidActivationToken
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::OperationTimeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Error envelope. The payload is either a message or a field map.
#[derive(Serialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Message(String),
    Fields(FieldErrors),
}

#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Render the standard error envelope with the given status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(ErrorEnvelope {
            error: ErrorBody::Message(message.into()),
        }),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Full detail stays in the logs; clients only see the envelope
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let message = match self {
            AppError::FailedValidation(fields) => {
                return (
                    status,
                    axum::Json(ErrorEnvelope {
                        error: ErrorBody::Fields(fields),
                    }),
                )
                    .into_response();
            }
            AppError::BadRequest(msg) => msg,
            AppError::NotFound => "the requested resource could not be found".to_string(),
            AppError::MethodNotAllowed(method) => {
                format!("the {method} method is not supported for this resource")
            }
            AppError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            AppError::RateLimited { retry_after } => {
                let mut response =
                    error_response(status, "rate limit exceeded, please try again later");
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));
                return response;
            }
            AppError::InvalidCredentials => {
                return challenge(status, "invalid authentication credentials or token");
            }
            AppError::InvalidJwtSignature => {
                return challenge(status, "invalid jwt token signature");
            }
            AppError::AuthenticationRequired => {
                return challenge(status, "you must be authenticated to access this resource");
            }
            AppError::InvalidActivationToken => "invalid or expired activation token".to_string(),
            AppError::InactiveAccount => {
                "your user account must be activated to access this resource".to_string()
            }
            AppError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
                    .to_string()
            }
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::OperationTimeout(_) => {
                SERVER_ERROR_MESSAGE.to_string()
            }
        };

        error_response(status, message)
    }
}

/// 401 response carrying the supported scheme challenge.
fn challenge(status: StatusCode, message: &str) -> Response {
    let mut response = error_response(status, message);
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::DuplicateEmail => {
                AppError::field("email", "a user with this email address already exists")
            }
            StoreError::Timeout(op) => AppError::OperationTimeout(op.to_string()),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
