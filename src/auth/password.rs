//! Stored password credential.
//!
//! Only the bcrypt hash is kept. A [`Password`] cannot exist without one,
//! so a user record always has something to match against.

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;

use crate::validation::MAX_PASSWORD_BYTES;

#[derive(Debug, Error)]
pub enum PasswordError {
    /// bcrypt ignores everything past 72 bytes, so longer input is refused
    /// instead of silently truncated.
    #[error("password exceeds {MAX_PASSWORD_BYTES} bytes")]
    TooLong,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    hash: String,
}

impl Password {
    /// Hash `plaintext` with the given bcrypt cost.
    pub fn set(plaintext: &str, cost: u32) -> Result<Self, PasswordError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong);
        }
        let hash = bcrypt::hash(plaintext, cost)?;
        Ok(Self { hash })
    }

    /// Wrap a hash loaded from storage.
    pub fn from_hash(hash: String) -> Self {
        Self { hash }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether `candidate` hashes to the stored value.
    ///
    /// A malformed stored hash is an error, a plain mismatch is `Ok(false)`.
    pub fn matches(&self, candidate: &str) -> Result<bool, PasswordError> {
        if candidate.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        Ok(bcrypt::verify(candidate, &self.hash)?)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Stand-in hash checked when a login names no known account, so a miss
/// costs the same bcrypt work as a wrong password.
pub struct DecoyPassword {
    cost: u32,
    hash: OnceLock<Option<Password>>,
}

impl DecoyPassword {
    const PLAINTEXT: &'static str = "greenlight-decoy-credential";

    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            hash: OnceLock::new(),
        }
    }

    /// Hash the decoy now instead of on the first unknown-email login.
    pub fn warm(&self) {
        self.password();
    }

    pub fn is_warm(&self) -> bool {
        self.hash.get().is_some()
    }

    /// Run a full bcrypt verification of `candidate` and discard the result.
    pub fn verify(&self, candidate: &str) {
        if let Some(password) = self.password() {
            let _ = password.matches(candidate);
        }
    }

    fn password(&self) -> Option<&Password> {
        self.hash
            .get_or_init(|| Password::set(Self::PLAINTEXT, self.cost).ok())
            .as_ref()
    }
}

impl fmt::Debug for DecoyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoyPassword")
            .field("cost", &self.cost)
            .field("warm", &self.is_warm())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[test]
    fn test_matches_only_original_plaintext() {
        let password = Password::set("pa55word-secret", COST).unwrap();
        assert!(password.matches("pa55word-secret").unwrap());
        assert!(!password.matches("pa55word-secreT").unwrap());
        assert!(!password.matches("").unwrap());
        assert_ne!(password.hash(), "pa55word-secret");
    }

    #[test]
    fn test_exactly_72_bytes_is_accepted() {
        let plaintext = "x".repeat(MAX_PASSWORD_BYTES);
        let password = Password::set(&plaintext, COST).unwrap();
        assert!(password.matches(&plaintext).unwrap());
    }

    #[test]
    fn test_longer_than_72_bytes_is_rejected_not_truncated() {
        let plaintext = "y".repeat(100);
        assert!(matches!(
            Password::set(&plaintext, COST),
            Err(PasswordError::TooLong)
        ));

        // A 73-byte candidate never matches a 72-byte prefix hash
        let prefix = "y".repeat(MAX_PASSWORD_BYTES);
        let password = Password::set(&prefix, COST).unwrap();
        assert!(!password.matches(&"y".repeat(MAX_PASSWORD_BYTES + 1)).unwrap());
    }

    #[test]
    fn test_same_plaintext_salts_differently() {
        let a = Password::set("correct horse", COST).unwrap();
        let b = Password::set("correct horse", COST).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        let password = Password::from_hash("not-a-bcrypt-hash".to_string());
        assert!(password.matches("anything").is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let password = Password::set("supersecret", COST).unwrap();
        assert_eq!(format!("{password:?}"), "Password(<redacted>)");
    }

    #[test]
    fn test_decoy_hashes_once_at_configured_cost() {
        let decoy = DecoyPassword::new(COST);
        assert!(!decoy.is_warm());

        decoy.verify("anything");
        assert!(decoy.is_warm());
        let hash = decoy.password().unwrap().hash().to_string();
        assert!(hash.starts_with("$2b$04$"));

        decoy.warm();
        assert_eq!(decoy.password().unwrap().hash(), hash);
    }
}
