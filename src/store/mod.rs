//! Storage capabilities consumed by the handlers and authenticators.
//!
//! Each concern is a trait so the HTTP layer never depends on a concrete
//! backend. [`Models`] bundles them and bounds every individual call with
//! its own deadline; a call that overruns surfaces as [`StoreError::Timeout`]
//! and is never retried.

mod memory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::auth::token::{TokenHash, TokenRecord, TokenScope};
use crate::models::{Movie, MovieQuery, User, UserQuery};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("store call {0} exceeded its deadline")]
    Timeout(&'static str),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Permission codes granted to one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Assign id, timestamp and version 1, then store. Emails are unique.
    async fn insert(&self, user: &mut User) -> StoreResult<()>;
    async fn get_by_id(&self, id: Uuid) -> StoreResult<User>;
    async fn get_by_email(&self, email: &str) -> StoreResult<User>;
    /// Owner of the token with this digest and scope. Expiry is left to the caller.
    async fn get_for_token(&self, scope: TokenScope, hash: &TokenHash)
    -> StoreResult<(User, TokenRecord)>;
    /// Replace the stored row when `user.version` still matches, bumping it by one.
    async fn update(&self, user: &mut User) -> StoreResult<()>;
    /// Remove the account together with its tokens and grants.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, usize)>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: &TokenRecord) -> StoreResult<()>;
    async fn for_user(&self, user_id: Uuid, scope: TokenScope) -> StoreResult<Vec<TokenRecord>>;
    async fn delete_all_for_user(&self, user_id: Uuid, scope: TokenScope) -> StoreResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// `NotFound` when the account holds no grants at all.
    async fn for_user(&self, user_id: Uuid) -> StoreResult<Permissions>;
    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> StoreResult<()>;
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;
    async fn get(&self, id: i64) -> StoreResult<Movie>;
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, usize)>;
}

/// All stores plus the per-call deadline.
#[derive(Clone)]
pub struct Models {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
    query_timeout: Duration,
}

impl Models {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        permissions: Arc<dyn PermissionStore>,
        movies: Arc<dyn MovieStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            permissions,
            movies,
            query_timeout,
        }
    }

    /// Every store backed by one shared in-process [`MemoryStore`].
    pub fn in_memory(query_timeout: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            query_timeout,
        )
    }

    /// Run one store call under the configured deadline.
    pub async fn timed<T, F>(&self, op: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.query_timeout.as_millis() as u64, "Store call timed out");
                Err(StoreError::Timeout(op))
            }
        }
    }
}
