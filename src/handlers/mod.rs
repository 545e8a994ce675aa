pub mod extract;
mod health;
pub mod movies;
mod tokens;
pub mod users;

use axum::http::Method;

use crate::error::AppError;

pub use health::{healthcheck, metrics};
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use tokens::{create_authentication_token, create_jwt};
pub use users::{activate_user, delete_user, list_users, register_user};

/// Fallback for paths no route matches.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Fallback for a known path requested with a method it does not accept.
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}
