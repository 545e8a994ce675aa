//! Activation and permission gates applied after authentication.
//!
//! Grants are fetched on every request so a revocation takes effect on the
//! very next call.

use tracing::debug;

use super::Identity;
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::store::{Models, StoreError};

/// Anonymous callers get 401, known but inactive accounts get 403.
pub fn require_activated(identity: &Identity) -> AppResult<&User> {
    let user = identity.user().ok_or(AppError::AuthenticationRequired)?;
    if !user.activated {
        debug!(user_id = %user.id, "Inactive account refused");
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

/// The account must hold `code`. Holding no grants at all is a plain refusal.
pub async fn require_permission(models: &Models, user: &User, code: &str) -> AppResult<()> {
    let permissions = match models
        .timed("permissions.for_user", models.permissions.for_user(user.id))
        .await
    {
        Ok(permissions) => permissions,
        Err(StoreError::NotFound) => return Err(AppError::NotPermitted),
        Err(e) => return Err(e.into()),
    };

    if !permissions.includes(code) {
        debug!(user_id = %user.id, permission = code, "Missing permission");
        return Err(AppError::NotPermitted);
    }
    Ok(())
}
