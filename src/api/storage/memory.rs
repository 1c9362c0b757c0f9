//! In-memory stores backing the router and handler tests.
//!
//! Honors the same contracts as the Postgres stores: the listing update is a
//! single compare-and-swap under the state lock, token lookups respect scope and
//! expiry, and deletes reject ids below 1 without counting a statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use super::StorageError;
use crate::api::handlers::{
    ads::{
        filters::{Filters, Metadata, SortColumn},
        storage::AdStore,
        types::Ad,
    },
    auth::{
        permission::PermissionSet,
        storage::{NewUser, PermissionStore, TokenStore, User, UserStore},
        token::{Scope, Token, TokenHash},
    },
};

struct StoredToken {
    hash: TokenHash,
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, HashSet<String>>,
    ads: BTreeMap<i64, Ad>,
    next_user_id: i64,
    next_ad_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    permission_lookups: AtomicUsize,
    delete_statements: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Timeout("memory store"))
        } else {
            Ok(())
        }
    }

    /// Make every subsequent call fail as if the database timed out.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn grant(&self, user_id: i64, codes: &[&str]) {
        self.state()
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|code| (*code).to_string()));
    }

    pub fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }

    pub fn delete_statements(&self) -> usize {
        self.delete_statements.load(Ordering::SeqCst)
    }

    pub async fn insert_user(&self, user: NewUser, activated: bool) -> User {
        let mut state = self.state();
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated,
            version: 1,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Store a token as-is, bypassing issuance (used to plant expired tokens).
    pub fn insert_raw_token(&self, token: &Token) {
        self.state().tokens.push(StoredToken {
            hash: token.hash,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.state().users.get(&id).cloned()
    }

    pub fn token_count(&self, scope: Scope, user_id: i64) -> usize {
        self.state()
            .tokens
            .iter()
            .filter(|token| token.scope == scope && token.user_id == user_id)
            .count()
    }

    pub fn ad_version(&self, id: i64) -> Option<i32> {
        self.state().ads.get(&id).map(|ad| ad.version)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError> {
        self.available()?;
        if self.state().users.values().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateEmail);
        }
        Ok(self.insert_user(user.clone(), false).await)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.available()?;
        Ok(self
            .state()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn get_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
    ) -> Result<Option<User>, StorageError> {
        self.available()?;
        let now = Utc::now();
        let state = self.state();
        Ok(state
            .tokens
            .iter()
            .find(|token| token.scope == scope && token.hash == *hash && token.expiry > now)
            .and_then(|token| state.users.get(&token.user_id).cloned()))
    }

    async fn update(&self, user: &User) -> Result<i32, StorageError> {
        self.available()?;
        let mut state = self.state();
        if state
            .users
            .values()
            .any(|other| other.id != user.id && other.email == user.email)
        {
            return Err(StorageError::DuplicateEmail);
        }
        match state.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                *stored = User {
                    version: user.version + 1,
                    ..user.clone()
                };
                Ok(stored.version)
            }
            _ => Err(StorageError::EditConflict),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), StorageError> {
        self.available()?;
        self.insert_raw_token(token);
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StorageError> {
        self.available()?;
        self.state()
            .tokens
            .retain(|token| !(token.scope == scope && token.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<PermissionSet, StorageError> {
        self.available()?;
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state()
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StorageError> {
        self.available()?;
        self.grant(user_id, codes);
        Ok(())
    }
}

fn title_matches(title: &str, query: &str) -> bool {
    let words: HashSet<String> = title.split_whitespace().map(str::to_lowercase).collect();
    query
        .split_whitespace()
        .all(|word| words.contains(&word.to_lowercase()))
}

#[async_trait]
impl AdStore for MemoryStore {
    async fn insert(&self, ad: &mut Ad) -> Result<(), StorageError> {
        self.available()?;
        let mut state = self.state();
        state.next_ad_id += 1;
        ad.id = state.next_ad_id;
        ad.created_at = Utc::now();
        ad.version = 1;
        state.ads.insert(ad.id, ad.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Ad, StorageError> {
        if id < 1 {
            return Err(StorageError::NotFound);
        }
        self.available()?;
        self.state()
            .ads
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Ad>, Metadata), StorageError> {
        self.available()?;
        let mut matched: Vec<Ad> = self
            .state()
            .ads
            .values()
            .filter(|ad| title.is_empty() || title_matches(&ad.title, title))
            .filter(|ad| categories.iter().all(|c| ad.categories.contains(c)))
            .cloned()
            .collect();

        let sort = filters.sort;
        matched.sort_by(|a, b| {
            let ordering = match sort.column {
                SortColumn::Id => a.id.cmp(&b.id),
                SortColumn::Title => a.title.cmp(&b.title),
                SortColumn::Price => a.price.cmp(&b.price),
            };
            let ordering = if sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = i64::try_from(matched.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(filters.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filters.limit()).unwrap_or(0);
        let page = matched.into_iter().skip(offset).take(limit).collect();
        Ok((
            page,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }

    async fn update(&self, ad: &Ad) -> Result<i32, StorageError> {
        self.available()?;
        let mut state = self.state();
        match state.ads.get_mut(&ad.id) {
            Some(stored) if stored.version == ad.version => {
                *stored = Ad {
                    version: ad.version + 1,
                    created_at: stored.created_at,
                    ..ad.clone()
                };
                Ok(stored.version)
            }
            _ => Err(StorageError::EditConflict),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        if id < 1 {
            return Err(StorageError::NotFound);
        }
        self.available()?;
        self.delete_statements.fetch_add(1, Ordering::SeqCst);
        self.state()
            .ads
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}
