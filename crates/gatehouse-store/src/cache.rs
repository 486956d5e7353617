//! The ephemeral cache: a fast key/value store for live-session data.
//!
//! Keys are namespaced per user (`userinfo:U1`, `websocket:U1`, ...).
//! Everything in it can be rebuilt from the durable store, so callers
//! treat it as best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_protocol::UserId;
use tokio::sync::Mutex;

use crate::StoreError;

/// Per-user key namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Session record written on CONNECT, removed on DISCONNECT.
    UserInfo,
    /// Private channel binding, written at registration elsewhere.
    WebSocket,
    /// Hydrated game state for a live session.
    GameInfo,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::UserInfo => "userinfo:",
            Self::WebSocket => "websocket:",
            Self::GameInfo => "gameinfo:",
        }
    }

    /// Builds the key for `user` in this namespace.
    pub fn key(self, user: &UserId) -> String {
        format!("{}{}", self.prefix(), user)
    }
}

/// Key/value cache the interceptor reads and writes through.
///
/// Implementations must tolerate concurrent callers; other parts of the
/// system write to the same cache.
pub trait EphemeralCache: Send + Sync + 'static {
    fn exists(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(
        &self,
        key: &str,
        value: String,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Removes `key`. Returns `true` if it was present.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
}

/// In-memory [`EphemeralCache`].
///
/// Clones share the same map, so one instance can be handed to the
/// interceptor and another to [`MemoryGameState`](crate::MemoryGameState).
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl EphemeralCache for MemoryCache {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_keys() {
        let user = UserId::new("U1");
        assert_eq!(Namespace::UserInfo.key(&user), "userinfo:U1");
        assert_eq!(Namespace::WebSocket.key(&user), "websocket:U1");
        assert_eq!(Namespace::GameInfo.key(&user), "gameinfo:U1");
    }

    #[tokio::test]
    async fn test_memory_cache_set_get_delete() {
        let cache = MemoryCache::new();
        assert!(!cache.exists("k").await.unwrap());

        cache.set("k", "v".into()).await.unwrap();
        assert!(cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap(), "second delete finds nothing");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_cache_clones_share_entries() {
        let a = MemoryCache::new();
        let b = a.clone();
        a.set("shared", "1".into()).await.unwrap();
        assert_eq!(b.get("shared").await.unwrap().as_deref(), Some("1"));
        assert_eq!(b.len().await, 1);
    }
}
