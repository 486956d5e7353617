//! Game state synchronization between the durable store and the cache.
//!
//! While a user is connected their game state lives in the ephemeral
//! cache (`gameinfo:<user>`), where gameplay code reads and mutates it.
//! CONNECT hydrates it from the durable store; DISCONNECT flushes it back.
//!
//! A cached entry is never replaced by hydration. It may hold progress
//! whose flush failed and is still queued for retry, so it is newer than
//! anything in the durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gatehouse_protocol::UserId;
use tokio::sync::Mutex;

use crate::{EphemeralCache, MemoryCache, Namespace, StoreError};

/// Moves a user's game state between durable storage and the cache.
pub trait GameStateService: Send + Sync + 'static {
    /// Loads the durable state for `user` into the cache, unless the
    /// cache already holds state for `user`.
    fn load_for_identity(
        &self,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Writes the cached state for `user` back to durable storage.
    fn persist_for_identity(
        &self,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Snapshot seeded for users with no durable state yet.
pub const EMPTY_SNAPSHOT: &str = "{}";

/// [`GameStateService`] backed by an in-memory "durable" map and a
/// [`MemoryCache`].
#[derive(Debug, Clone)]
pub struct MemoryGameState {
    durable: Arc<Mutex<HashMap<UserId, String>>>,
    cache: MemoryCache,
    loads: Arc<AtomicUsize>,
    persists: Arc<AtomicUsize>,
}

impl MemoryGameState {
    /// Creates a service that hydrates into `cache`.
    pub fn new(cache: MemoryCache) -> Self {
        Self {
            durable: Arc::default(),
            cache,
            loads: Arc::default(),
            persists: Arc::default(),
        }
    }

    /// Writes a durable snapshot directly, as if saved by an earlier session.
    pub async fn seed(&self, user: UserId, snapshot: impl Into<String>) {
        self.durable.lock().await.insert(user, snapshot.into());
    }

    /// Reads the durable snapshot for `user`.
    pub async fn durable_snapshot(&self, user: &UserId) -> Option<String> {
        self.durable.lock().await.get(user).cloned()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn persists(&self) -> usize {
        self.persists.load(Ordering::Relaxed)
    }
}

impl GameStateService for MemoryGameState {
    async fn load_for_identity(&self, user: &UserId) -> Result<(), StoreError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let key = Namespace::GameInfo.key(user);
        if self.cache.exists(&key).await? {
            tracing::debug!(%user, "cached game state kept");
            return Ok(());
        }
        let snapshot = self
            .durable
            .lock()
            .await
            .get(user)
            .cloned()
            .unwrap_or_else(|| EMPTY_SNAPSHOT.to_string());
        self.cache.set(&key, snapshot).await?;
        tracing::debug!(%user, "game state hydrated");
        Ok(())
    }

    async fn persist_for_identity(&self, user: &UserId) -> Result<(), StoreError> {
        self.persists.fetch_add(1, Ordering::Relaxed);
        let Some(snapshot) = self.cache.get(&Namespace::GameInfo.key(user)).await? else {
            tracing::debug!(%user, "no cached game state to persist");
            return Ok(());
        };
        self.durable.lock().await.insert(user.clone(), snapshot);
        tracing::debug!(%user, "game state persisted");
        Ok(())
    }
}
