//! In-process store used by the binary and the tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    MovieStore, PermissionStore, Permissions, StoreError, StoreResult, TokenStore, UserStore,
};
use crate::auth::token::{TokenHash, TokenRecord, TokenScope};
use crate::models::{Movie, MovieQuery, SortDirection, User, UserQuery};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: Vec<TokenRecord>,
    permissions: HashMap<Uuid, BTreeSet<String>>,
    movies: BTreeMap<i64, Movie>,
    next_movie_id: i64,
}

/// All tables behind a single lock so cross-table operations stay consistent.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(tables: &Tables, email: &str, except: Uuid) -> bool {
    tables
        .users
        .values()
        .any(|u| u.id != except && u.email.eq_ignore_ascii_case(email))
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if email_taken(&tables, &user.email, Uuid::nil()) {
            return Err(StoreError::DuplicateEmail);
        }
        user.id = Uuid::new_v4();
        user.created_at = Utc::now();
        user.version = 1;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
    ) -> StoreResult<(User, TokenRecord)> {
        let tables = self.tables.read().await;
        let record = tables
            .tokens
            .iter()
            .find(|t| t.scope == scope && &t.hash == hash)
            .ok_or(StoreError::NotFound)?;
        let user = tables
            .users
            .get(&record.user_id)
            .ok_or(StoreError::NotFound)?;
        Ok((user.clone(), record.clone()))
    }

    async fn update(&self, user: &mut User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored_version = tables
            .users
            .get(&user.id)
            .map(|u| u.version)
            .ok_or(StoreError::EditConflict)?;
        if stored_version != user.version {
            return Err(StoreError::EditConflict);
        }
        if email_taken(&tables, &user.email, user.id) {
            return Err(StoreError::DuplicateEmail);
        }
        user.version += 1;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id).ok_or(StoreError::NotFound)?;
        tables.tokens.retain(|t| t.user_id != id);
        tables.permissions.remove(&id);
        Ok(())
    }

    async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, usize)> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| query.filter.matches(u))
            .cloned()
            .collect();
        let total = users.len();

        let filters = &query.filters;
        let direction = filters.sort_direction();
        users.sort_by(|a, b| {
            let primary = match filters.sort_column() {
                "name" => a.name.cmp(&b.name),
                "email" => a.email.cmp(&b.email),
                "created_at" => a.created_at.cmp(&b.created_at),
                _ => a.id.cmp(&b.id),
            };
            directed(primary, direction).then_with(|| a.id.cmp(&b.id))
        });

        Ok((filters.paginate(users), total))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, record: &TokenRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&record.user_id) {
            return Err(StoreError::Backend(format!(
                "token owner {} does not exist",
                record.user_id
            )));
        }
        tables.tokens.push(record.clone());
        Ok(())
    }

    async fn for_user(&self, user_id: Uuid, scope: TokenScope) -> StoreResult<Vec<TokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.scope == scope)
            .cloned()
            .collect())
    }

    async fn delete_all_for_user(&self, user_id: Uuid, scope: TokenScope) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .tokens
            .retain(|t| !(t.user_id == user_id && t.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn for_user(&self, user_id: Uuid) -> StoreResult<Permissions> {
        let tables = self.tables.read().await;
        match tables.permissions.get(&user_id) {
            Some(codes) if !codes.is_empty() => {
                Ok(Permissions::new(codes.iter().cloned().collect()))
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        tables
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.next_movie_id += 1;
        movie.id = tables.next_movie_id;
        movie.created_at = Utc::now();
        movie.version = 1;
        tables.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        let tables = self.tables.read().await;
        tables.movies.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .movies
            .get_mut(&movie.id)
            .ok_or(StoreError::EditConflict)?;
        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }
        movie.version += 1;
        *stored = movie.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, usize)> {
        let tables = self.tables.read().await;
        let mut movies: Vec<Movie> = tables
            .movies
            .values()
            .filter(|m| query.filter.matches(m))
            .cloned()
            .collect();
        let total = movies.len();

        let filters = &query.filters;
        let direction = filters.sort_direction();
        movies.sort_by(|a, b| {
            let primary = match filters.sort_column() {
                "title" => a.title.cmp(&b.title),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.cmp(&b.runtime),
                _ => a.id.cmp(&b.id),
            };
            directed(primary, direction).then_with(|| a.id.cmp(&b.id))
        });

        Ok((filters.paginate(movies), total))
    }
}
