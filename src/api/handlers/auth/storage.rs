//! Database helpers for users, tokens and permissions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use utoipa::ToSchema;

use super::{
    permission::PermissionSet,
    token::{Scope, Token, TokenHash},
};
use crate::api::storage::{StorageError, bounded, is_unique_violation};

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Fields supplied when registering a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an inactive user. Fails with `DuplicateEmail` on a taken email.
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// Owner of a non-expired token with the given scope and digest.
    async fn get_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
    ) -> Result<Option<User>, StorageError>;

    /// Version-checked update; returns the new version or `EditConflict`.
    async fn update(&self, user: &User) -> Result<i32, StorageError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the digest, owner, scope and expiry. Never the plaintext.
    async fn insert(&self, token: &Token) -> Result<(), StorageError>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StorageError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<PermissionSet, StorageError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StorageError>;
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        created_at: row.get("created_at"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        activated: row.get("activated"),
        version: row.get("version"),
    }
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError> {
        let query = r"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id, created_at, name, email, password_hash, activated, version
        ";
        let result = bounded(
            "insert user",
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query)),
        )
        .await;

        match result {
            Ok(row) => Ok(user_from_row(&row)),
            Err(StorageError::Database(err)) if is_unique_violation(&err) => {
                Err(StorageError::DuplicateEmail)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let query = r"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE email = $1
        ";
        let row = bounded(
            "get user by email",
            sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query)),
        )
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
    ) -> Result<Option<User>, StorageError> {
        let query = r"
            SELECT u.id, u.created_at, u.name, u.email, u.password_hash, u.activated, u.version
            FROM users u
            INNER JOIN tokens t ON t.user_id = u.id
            WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3
        ";
        let row = bounded(
            "get user for token",
            sqlx::query(query)
                .bind(hash.as_bytes().as_slice())
                .bind(scope.as_str())
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query)),
        )
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update(&self, user: &User) -> Result<i32, StorageError> {
        let query = r"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        ";
        let result = bounded(
            "update user",
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool)
                .instrument(db_span("UPDATE", query)),
        )
        .await;

        match result {
            Ok(Some(row)) => Ok(row.get("version")),
            Ok(None) => Err(StorageError::EditConflict),
            Err(StorageError::Database(err)) if is_unique_violation(&err) => {
                Err(StorageError::DuplicateEmail)
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &Token) -> Result<(), StorageError> {
        let query = "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)";
        bounded(
            "insert token",
            sqlx::query(query)
                .bind(token.hash.as_bytes().as_slice())
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool)
                .instrument(db_span("INSERT", query)),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StorageError> {
        let query = "DELETE FROM tokens WHERE scope = $1 AND user_id = $2";
        bounded(
            "delete tokens",
            sqlx::query(query)
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .instrument(db_span("DELETE", query)),
        )
        .await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<PermissionSet, StorageError> {
        let query = r"
            SELECT p.code
            FROM permissions p
            INNER JOIN users_permissions up ON up.permission_id = p.id
            WHERE up.user_id = $1
        ";
        let rows = bounded(
            "get permissions",
            sqlx::query(query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .instrument(db_span("SELECT", query)),
        )
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("code"))
            .collect())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StorageError> {
        let query = r"
            INSERT INTO users_permissions
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
        ";
        let codes: Vec<String> = codes.iter().map(|code| (*code).to_string()).collect();
        bounded(
            "add permissions",
            sqlx::query(query)
                .bind(user_id)
                .bind(codes)
                .execute(&self.pool)
                .instrument(db_span("INSERT", query)),
        )
        .await?;
        Ok(())
    }
}
