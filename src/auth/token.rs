//! Opaque token issuer and matcher.
//!
//! A token is 16 random bytes rendered as unpadded URL-safe base64. The
//! plaintext goes back to the caller once; only its SHA-256 digest is kept.
//! Expiry is checked by whoever uses the token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 16;

/// Length of the encoded plaintext (16 bytes in unpadded base64).
pub const TOKEN_LENGTH: usize = 22;

pub type TokenHash = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

/// What gets stored: the digest, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: TokenHash,
    pub user_id: Uuid,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// A freshly generated token. `plaintext` is handed out exactly once.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: String,
    pub record: TokenRecord,
}

/// Response body for an issued token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenView {
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl From<&IssuedToken> for TokenView {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            token: issued.plaintext.clone(),
            expiry: issued.record.expiry,
            scope: issued.record.scope,
        }
    }
}

/// Generate a token for `user_id` valid for `ttl` from now.
pub fn generate(user_id: Uuid, ttl: Duration, scope: TokenScope) -> IssuedToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&plaintext);

    IssuedToken {
        plaintext,
        record: TokenRecord {
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        },
    }
}

pub fn hash_token(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Whether `plaintext` has the shape of an issued token.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Find the stored record whose digest equals the digest of `candidate`.
///
/// Every record is compared in constant time and the scan does not stop
/// early, so timing does not depend on where the match sits.
pub fn match_token<'a>(records: &'a [TokenRecord], candidate: &str) -> Option<&'a TokenRecord> {
    let digest = hash_token(candidate);
    let mut found = None;
    for record in records {
        if bool::from(record.hash.as_slice().ct_eq(digest.as_slice())) && found.is_none() {
            found = Some(record);
        }
    }
    found
}
