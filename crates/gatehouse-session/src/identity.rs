//! Principals and the identity store.
//!
//! The interceptor never depends on a concrete account type. It asks the
//! [`IdentityStore`] for an `Arc<dyn Principal>` and only ever reads the
//! user id back out of it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gatehouse_protocol::UserId;
use tokio::sync::RwLock;

use crate::SessionError;

/// The authenticated caller bound to a session.
pub trait Principal: fmt::Debug + Send + Sync + 'static {
    /// Stable identifier of the caller.
    fn user_id(&self) -> &UserId;
}

/// Looks up accounts by user id.
pub trait IdentityStore: Send + Sync + 'static {
    /// Returns the active account for `user_id`.
    ///
    /// Soft-deleted accounts must come back as `Ok(None)`, exactly like
    /// accounts that never existed. `Err` is reserved for the store itself
    /// failing.
    fn find_active(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<Arc<dyn Principal>>, SessionError>>
           + Send;
}

impl<T: IdentityStore> IdentityStore for Arc<T> {
    fn find_active(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<Arc<dyn Principal>>, SessionError>>
           + Send {
        (**self).find_active(user_id)
    }
}

/// An account row as the in-memory store keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub nickname: String,
    /// Unix millis of the soft delete, if the account was deleted.
    pub deleted_at: Option<u64>,
}

impl Account {
    /// A live account.
    pub fn active(user_id: UserId, nickname: impl Into<String>) -> Self {
        Self {
            user_id,
            nickname: nickname.into(),
            deleted_at: None,
        }
    }
}

impl Principal for Account {
    fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// In-memory [`IdentityStore`] for development servers and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    accounts: RwLock<HashMap<UserId, Account>>,
    lookups: AtomicUsize,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|a| (a.user_id.clone(), a))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Inserts or replaces an account.
    pub async fn insert(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.user_id.clone(), account);
    }

    /// Marks an account deleted. Returns `false` if it doesn't exist.
    pub async fn soft_delete(&self, user_id: &UserId, at: u64) -> bool {
        match self.accounts.write().await.get_mut(user_id) {
            Some(account) => {
                account.deleted_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Number of `find_active` calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl IdentityStore for MemoryIdentityStore {
    async fn find_active(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Arc<dyn Principal>>, SessionError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(user_id)
            .filter(|a| a.deleted_at.is_none())
            .map(|a| Arc::new(a.clone()) as Arc<dyn Principal>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[tokio::test]
    async fn test_find_active_returns_live_account() {
        let store = MemoryIdentityStore::with_accounts([Account::active(uid("U1"), "kim")]);
        let principal = store.find_active(&uid("U1")).await.unwrap().unwrap();
        assert_eq!(principal.user_id(), &uid("U1"));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_find_active_unknown_is_none() {
        let store = MemoryIdentityStore::new();
        assert!(store.find_active(&uid("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_active_filters_soft_deleted() {
        let store = MemoryIdentityStore::with_accounts([Account::active(uid("U1"), "kim")]);
        assert!(store.soft_delete(&uid("U1"), 1_700_000_000_000).await);

        assert!(store.find_active(&uid("U1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_unknown_returns_false() {
        let store = MemoryIdentityStore::new();
        assert!(!store.soft_delete(&uid("U9"), 0).await);
    }

    #[tokio::test]
    async fn test_insert_replaces_account() {
        let store = MemoryIdentityStore::new();
        store.insert(Account::active(uid("U1"), "a")).await;
        let mut deleted = Account::active(uid("U1"), "a");
        deleted.deleted_at = Some(5);
        store.insert(deleted).await;

        assert!(store.find_active(&uid("U1")).await.unwrap().is_none());
    }
}
