//! Request readers shared by the handlers.
//!
//! [`JsonBody`] replaces `axum::Json` so that every malformed body answers
//! with a short, specific message in the standard error envelope.
//! [`QueryParams`] reads query strings leniently and reports bad values as
//! field errors instead of rejecting the whole request.

use std::collections::HashMap;

use axum::body::to_bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::validation::Validator;

/// A JSON request body of type `T`.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T> FromRequest<AppState> for JsonBody<T>
where
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let limit = state.config.max_request_body_size;
        let bytes = to_bytes(req.into_body(), limit).await.map_err(|_| {
            AppError::BadRequest(format!("body must not be larger than {limit} bytes"))
        })?;

        decode_json(&bytes).map(JsonBody)
    }
}

/// Decode exactly one JSON value of type `T` from `bytes`.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("body must not be empty".to_string()));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(describe_json_error)?;
    de.end().map_err(|_| {
        AppError::BadRequest("body must only contain a single JSON value".to_string())
    })?;
    Ok(value)
}

fn describe_json_error(e: serde_json::Error) -> AppError {
    let message = match e.classify() {
        Category::Syntax | Category::Eof => format!(
            "body contains badly-formed JSON (at line {} column {})",
            e.line(),
            e.column()
        ),
        Category::Data => match unknown_field(&e.to_string()) {
            Some(field) => format!("body contains unknown key \"{field}\""),
            None => format!(
                "body contains incorrect JSON type (at line {} column {})",
                e.line(),
                e.column()
            ),
        },
        Category::Io => "unable to read body".to_string(),
    };
    AppError::BadRequest(message)
}

/// Field name from serde's "unknown field `x`, expected ..." message.
fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split_once('`').map(|(field, _)| field)
}

/// Raw query string values.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(HashMap<String, String>);

impl<S: Send + Sync> FromRequestParts<S> for QueryParams {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(map) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(Self(map))
    }
}

impl QueryParams {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// The value for `key`, or `default` when absent or blank.
    pub fn string(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }

    /// Comma separated values, or `default` when absent or blank.
    pub fn csv(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.0.get(key) {
            Some(value) if !value.is_empty() => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// An integer, or `default` when absent. A non-integer records a field error.
    pub fn int(&self, key: &str, default: u64, v: &mut Validator) -> u64 {
        match self.0.get(key) {
            None => default,
            Some(value) if value.is_empty() => default,
            Some(value) => value.parse().unwrap_or_else(|_| {
                v.add_error(key, "must be an integer value");
                default
            }),
        }
    }
}

/// Movie id from the path. Anything but a positive integer is "not found".
pub fn movie_id(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

/// User id from the path. Anything but a UUID is "not found".
pub fn user_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}
