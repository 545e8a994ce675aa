use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::password::Password;
use crate::models::filters::Filters;
use crate::validation::{Validator, validate_email, validate_name, validate_password_plaintext};

/// Sort keys accepted by `GET /v1/users`.
pub const USER_SORT_SAFELIST: &[&str] = &[
    "id",
    "name",
    "email",
    "created_at",
    "-id",
    "-name",
    "-email",
    "-created_at",
];

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// Build an unsaved account. Id, timestamp and version are set on insert.
    pub fn new(name: String, email: String, password: Password) -> Self {
        Self {
            id: Uuid::nil(),
            created_at: Utc::now(),
            name,
            email,
            password,
            activated: false,
            version: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterUserRequest {
    pub fn validate(&self, v: &mut Validator) {
        validate_name(v, &self.name);
        validate_email(v, &self.email);
        validate_password_plaintext(v, &self.password);
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    #[serde(default)]
    pub token: String,
}

/// Name and email substring filters for listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub name: String,
    pub email: String,
}

/// A validated listing request.
#[derive(Debug, Clone)]
pub struct UserQuery {
    pub filter: UserFilter,
    pub filters: Filters,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        contains_ignore_case(&user.name, &self.name) && contains_ignore_case(&user.email, &self.email)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str) -> User {
        User::new(
            name.to_string(),
            email.to_string(),
            Password::from_hash("$2b$04$invalid".to_string()),
        )
    }

    #[test]
    fn test_serialization_hides_password_and_version() {
        let json = serde_json::to_value(user("Alice", "alice@example.com")).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["activated"], false);
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn test_filter_substring_case_insensitive() {
        let filter = UserFilter {
            name: "ali".into(),
            email: "EXAMPLE".into(),
        };
        assert!(filter.matches(&user("Alice", "alice@example.com")));
        assert!(!filter.matches(&user("Bob", "bob@example.com")));
        assert!(UserFilter::default().matches(&user("Bob", "bob@example.com")));
    }

    #[test]
    fn test_register_request_rejects_unknown_fields() {
        let result: Result<RegisterUserRequest, _> =
            serde_json::from_str(r#"{"name":"a","email":"b","password":"c","admin":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let req = RegisterUserRequest {
            name: String::new(),
            email: "nope".into(),
            password: "short".into(),
        };
        let mut v = Validator::new();
        req.validate(&mut v);
        match v.finish() {
            Err(crate::error::AppError::FailedValidation(errors)) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
