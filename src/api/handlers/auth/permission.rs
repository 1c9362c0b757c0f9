//! Authorization ladder.
//!
//! Three tiers nest: authenticated, then activated, then holding a capability
//! code. Each tier rejects with its own error before the next one runs, so an
//! anonymous principal never triggers a permission lookup.

use std::{collections::HashSet, sync::Arc};

use super::{
    principal::{AuthenticatedUser, Principal},
    storage::PermissionStore,
};
use crate::api::storage::StorageError;

pub const ADS_READ: &str = "ads:read";
pub const ADS_WRITE: &str = "ads:write";

/// Capability codes granted to a user. Membership is exact string match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    #[must_use]
    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("account not activated")]
    InactiveAccount,
    #[error("permission denied")]
    NotPermitted,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct PermissionGate {
    store: Arc<dyn PermissionStore>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `AuthenticationRequired` for anonymous principals.
    pub fn require_authenticated(principal: &Principal) -> Result<&AuthenticatedUser, AuthzError> {
        match principal {
            Principal::Anonymous => Err(AuthzError::AuthenticationRequired),
            Principal::Authenticated(user) => Ok(user),
        }
    }

    /// # Errors
    /// `AuthenticationRequired` or `InactiveAccount`, in that order.
    pub fn require_activated(principal: &Principal) -> Result<&AuthenticatedUser, AuthzError> {
        let user = Self::require_authenticated(principal)?;
        if user.activated {
            Ok(user)
        } else {
            Err(AuthzError::InactiveAccount)
        }
    }

    /// Authorize `principal` for `code`, walking the full ladder.
    ///
    /// # Errors
    /// The first failing tier's error, or `Storage` if the permission lookup fails.
    pub async fn authorize(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<AuthenticatedUser, AuthzError> {
        let user = *Self::require_activated(principal)?;
        let permissions = self.store.get_all_for_user(user.id).await?;
        if permissions.include(code) {
            Ok(user)
        } else {
            Err(AuthzError::NotPermitted)
        }
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::storage::memory::MemoryStore;

    fn gate() -> (PermissionGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PermissionGate::new(store.clone()), store)
    }

    fn user(id: i64, activated: bool) -> Principal {
        Principal::Authenticated(AuthenticatedUser { id, activated })
    }

    #[test]
    fn permission_set_membership_is_exact() {
        let set: PermissionSet = vec![ADS_READ.to_string()].into_iter().collect();
        assert!(set.include("ads:read"));
        assert!(!set.include("ads:rea"));
        assert!(!set.include("ads:write"));
    }

    #[tokio::test]
    async fn anonymous_fails_before_any_lookup() {
        let (gate, store) = gate();
        for code in [ADS_READ, ADS_WRITE, "anything:else"] {
            let result = gate.authorize(&Principal::Anonymous, code).await;
            assert!(matches!(result, Err(AuthzError::AuthenticationRequired)));
        }
        assert_eq!(store.permission_lookups(), 0);
    }

    #[tokio::test]
    async fn inactive_user_fails_before_lookup() {
        let (gate, store) = gate();
        store.grant(1, &[ADS_READ]);
        let result = gate.authorize(&user(1, false), ADS_READ).await;
        assert!(matches!(result, Err(AuthzError::InactiveAccount)));
        assert_eq!(store.permission_lookups(), 0);
    }

    #[tokio::test]
    async fn activated_user_needs_the_code() {
        let (gate, store) = gate();
        store.grant(1, &[ADS_READ]);

        let granted = gate.authorize(&user(1, true), ADS_READ).await.unwrap();
        assert_eq!(granted.id, 1);

        let denied = gate.authorize(&user(1, true), ADS_WRITE).await;
        assert!(matches!(denied, Err(AuthzError::NotPermitted)));
        assert_eq!(store.permission_lookups(), 2);
    }

    #[test]
    fn lower_tiers_are_checked_first() {
        assert!(matches!(
            PermissionGate::require_activated(&Principal::Anonymous),
            Err(AuthzError::AuthenticationRequired)
        ));
        assert!(PermissionGate::require_authenticated(&user(3, false)).is_ok());
        assert!(matches!(
            PermissionGate::require_activated(&user(3, false)),
            Err(AuthzError::InactiveAccount)
        ));
    }
}
