//! Bearer token authentication and principal resolution.
//!
//! Flow Overview: read the `Authorization` header, resolve the presented token
//! to its owner by digest, and attach a [`Principal`] to the request. A missing
//! header yields [`Principal::Anonymous`]; a malformed or unknown token is
//! rejected with 401 before any handler runs.

use axum::{
    extract::{Request, State},
    http::{
        HeaderValue,
        header::{AUTHORIZATION, VARY},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{
    storage::{TokenStore, User, UserStore},
    token::{Scope, Token, TokenHash, is_well_formed},
};
use crate::api::{AppState, error::ApiError, storage::StorageError};

/// Resolved identity of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Authenticated(AuthenticatedUser),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub activated: bool,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            activated: user.activated,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid authentication token")]
    InvalidToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Issues tokens and resolves presented ones.
pub struct TokenAuthenticator {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
}

impl TokenAuthenticator {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { users, tokens }
    }

    /// Generate and persist a token. The returned plaintext is the only copy.
    ///
    /// # Errors
    /// Returns an error if generation or persistence fails.
    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> anyhow::Result<Token> {
        let token = Token::generate(user_id, ttl, scope)?;
        self.tokens.insert(&token).await?;
        debug!(user_id, scope = %scope, expiry = %token.expiry, "token issued");
        Ok(token)
    }

    /// Owner of a live token presented in plaintext, if any.
    ///
    /// # Errors
    /// Returns a `StorageError` if the lookup fails.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<Option<User>, StorageError> {
        self.users
            .get_for_token(scope, &TokenHash::of(plaintext))
            .await
    }

    /// Revoke every token of `scope` held by `user_id`.
    ///
    /// # Errors
    /// Returns a `StorageError` if the delete fails.
    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> Result<(), StorageError> {
        self.tokens.delete_all_for_user(scope, user_id).await
    }

    /// Resolve a raw `Authorization` header value into a principal.
    ///
    /// # Errors
    /// `InvalidToken` for a wrong scheme, a structurally invalid token, or a
    /// token that is unknown, expired or of another scope.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let Some(header) = header.filter(|value| !value.is_empty()) else {
            return Ok(Principal::Anonymous);
        };

        let token = match header.split(' ').collect::<Vec<_>>().as_slice() {
            ["Bearer", token] => *token,
            _ => return Err(AuthError::InvalidToken),
        };

        if !is_well_formed(token) {
            return Err(AuthError::InvalidToken);
        }

        match self.resolve(Scope::Authentication, token).await? {
            Some(user) => Ok(Principal::Authenticated(AuthenticatedUser::from(&user))),
            None => Err(AuthError::InvalidToken),
        }
    }
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator").finish_non_exhaustive()
    }
}

/// Middleware attaching the request's [`Principal`] as an extension.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = match request.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(value) => Some(value.to_string()),
            Err(_) => return with_vary(ApiError::InvalidToken.into_response()),
        },
    };

    let principal = match state.authenticator().authenticate(header.as_deref()).await {
        Ok(principal) => principal,
        Err(err) => return with_vary(ApiError::from(err).into_response()),
    };

    request.extensions_mut().insert(principal);
    with_vary(next.run(request).await)
}

fn with_vary(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{handlers::auth::storage::NewUser, storage::memory::MemoryStore};
    use secrecy::ExposeSecret;

    async fn setup(activated: bool) -> (TokenAuthenticator, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(
                NewUser {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    password_hash: "hash".to_string(),
                },
                activated,
            )
            .await;
        (
            TokenAuthenticator::new(store.clone(), store.clone()),
            store,
            user,
        )
    }

    #[tokio::test]
    async fn missing_or_empty_header_is_anonymous() {
        let (auth, _, _) = setup(true).await;
        assert_eq!(auth.authenticate(None).await.unwrap(), Principal::Anonymous);
        assert_eq!(
            auth.authenticate(Some("")).await.unwrap(),
            Principal::Anonymous
        );
    }

    #[tokio::test]
    async fn malformed_headers_are_invalid() {
        let (auth, _, _) = setup(true).await;
        for header in [
            "Basic ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer",
            "Bearer short",
            "Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ extra",
            "BearerABCDEFGHIJKLMNOPQRSTUVWXYZ",
        ] {
            let result = auth.authenticate(Some(header)).await;
            assert!(
                matches!(result, Err(AuthError::InvalidToken)),
                "header {header:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (auth, _, _) = setup(true).await;
        let result = auth
            .authenticate(Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn issued_token_resolves_to_owner() {
        let (auth, _, user) = setup(false).await;
        let token = auth
            .issue(user.id, Duration::from_secs(3600), Scope::Authentication)
            .await
            .unwrap();
        let header = format!("Bearer {}", token.plaintext.expose_secret());
        let principal = auth.authenticate(Some(&header)).await.unwrap();
        assert_eq!(
            principal,
            Principal::Authenticated(AuthenticatedUser {
                id: user.id,
                activated: false
            })
        );
    }

    #[tokio::test]
    async fn expired_token_is_invalid_even_if_hash_matches() {
        let (auth, store, user) = setup(true).await;
        let mut token =
            Token::generate(user.id, Duration::from_secs(60), Scope::Authentication).unwrap();
        token.expiry = chrono::Utc::now() - chrono::Duration::seconds(1);
        store.insert_raw_token(&token);

        let header = format!("Bearer {}", token.plaintext.expose_secret());
        let result = auth.authenticate(Some(&header)).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn activation_tokens_do_not_authenticate() {
        let (auth, _, user) = setup(true).await;
        let token = auth
            .issue(user.id, Duration::from_secs(3600), Scope::Activation)
            .await
            .unwrap();
        let header = format!("Bearer {}", token.plaintext.expose_secret());
        let result = auth.authenticate(Some(&header)).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn revoked_tokens_stop_resolving() {
        let (auth, _, user) = setup(true).await;
        let token = auth
            .issue(user.id, Duration::from_secs(3600), Scope::Activation)
            .await
            .unwrap();
        let plaintext = token.plaintext.expose_secret();
        assert!(auth.resolve(Scope::Activation, plaintext).await.unwrap().is_some());

        auth.revoke_all(Scope::Activation, user.id).await.unwrap();
        assert!(auth.resolve(Scope::Activation, plaintext).await.unwrap().is_none());
    }
}
