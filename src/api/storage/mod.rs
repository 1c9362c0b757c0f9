//! Storage contracts shared by the handlers.
//!
//! Every store is an `async-trait` object so the router can be wired against
//! Postgres in production and an in-memory backend in tests. All Postgres
//! calls are bounded by [`QUERY_TIMEOUT`]; an expired call surfaces as
//! [`StorageError::Timeout`] and is reported to the client as an internal error.

use sqlx::PgPool;
use std::{future::Future, sync::Arc, time::Duration};

use super::handlers::{
    ads::storage::{AdStore, PgAdStore},
    auth::storage::{
        PermissionStore, PgPermissionStore, PgTokenStore, PgUserStore, TokenStore, UserStore,
    },
};

#[cfg(test)]
pub(crate) mod memory;

/// Upper bound for a single statement against the backing store.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("{0} timed out after {QUERY_TIMEOUT:?}")]
    Timeout(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Run a store call under [`QUERY_TIMEOUT`].
///
/// # Errors
/// Returns `StorageError::Timeout` when the deadline elapses, otherwise the
/// call's own error converted into a `StorageError`.
pub async fn bounded<T, E, F>(operation: &'static str, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StorageError>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StorageError::Timeout(operation)),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// The set of stores the API is wired against.
#[derive(Clone)]
pub struct Stores {
    pub ads: Arc<dyn AdStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            ads: Arc::new(PgAdStore::new(pool.clone())),
            users: Arc::new(PgUserStore::new(pool.clone())),
            tokens: Arc::new(PgTokenStore::new(pool.clone())),
            permissions: Arc::new(PgPermissionStore::new(pool)),
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let ok: Result<i32, StorageError> =
            bounded("noop", async { Ok::<_, StorageError>(7) }).await;
        assert!(matches!(ok, Ok(7)));

        let err: Result<i32, StorageError> =
            bounded("noop", async { Err::<i32, _>(sqlx::Error::RowNotFound) }).await;
        assert!(matches!(err, Err(StorageError::Database(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out_slow_calls() {
        let result: Result<(), StorageError> = bounded("slow", async {
            tokio::time::sleep(QUERY_TIMEOUT * 2).await;
            Ok::<_, StorageError>(())
        })
        .await;
        assert!(matches!(result, Err(StorageError::Timeout("slow"))));
    }

    #[test]
    fn unique_violation_ignores_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
