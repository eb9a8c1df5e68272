//! Per-conversation TTL cache.
//!
//! Every entry lives in a partition keyed by the conversation (chat) id, so
//! staleness in one conversation never leaks into another and each
//! conversation can be invalidated on its own. The cache is strictly
//! best-effort: backend failures degrade to a miss or a logged no-op and are
//! never surfaced to callers.

mod memory;

pub use memory::MemoryCacheStore;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Conversation identifier owning a cache partition.
pub type PartitionKey = i64;

/// A cached payload together with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Opaque cached payload
    pub value: Value,
    /// Lookups treat the entry as absent from this instant on
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` from now.
    #[must_use]
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Whether the entry may still be returned at `now`.
    #[must_use]
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Failures of a partition store backend.
///
/// These never cross the [`PartitionedCache`] boundary.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend rejected or could not complete the operation
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Storage behind the partitioned cache.
///
/// Implementations only store and remove; TTL enforcement happens in
/// [`PartitionedCache`] so every backend gets the same expiry semantics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load an entry, expired or not
    async fn load(
        &self,
        partition: PartitionKey,
        key: &str,
    ) -> Result<Option<CacheEntry>, CacheError>;
    /// Store an entry, replacing any previous one
    async fn store(
        &self,
        partition: PartitionKey,
        key: &str,
        entry: CacheEntry,
    ) -> Result<(), CacheError>;
    /// Remove a single entry
    async fn remove(&self, partition: PartitionKey, key: &str) -> Result<(), CacheError>;
    /// Remove every entry of the partition whose key starts with `prefix`
    async fn remove_prefix(&self, partition: PartitionKey, prefix: &str)
        -> Result<(), CacheError>;
}

/// Best-effort cache partitioned by conversation.
#[derive(Clone)]
pub struct PartitionedCache {
    store: Arc<dyn CacheStore>,
}

impl PartitionedCache {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// In-memory cache bounded to `max_capacity` entries.
    #[must_use]
    pub fn in_memory(max_capacity: u64) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(max_capacity)))
    }

    /// Scope operations to one conversation.
    #[must_use]
    pub fn partition(&self, key: PartitionKey) -> Partition<'_> {
        Partition { cache: self, key }
    }
}

/// Cache operations bound to a single partition.
pub struct Partition<'a> {
    cache: &'a PartitionedCache,
    key: PartitionKey,
}

impl Partition<'_> {
    /// Returns the live value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.cache.store.load(self.key, key).await {
            Ok(Some(entry)) if entry.is_live(Instant::now()) => {
                debug!(partition = self.key, key, "Cache HIT");
                Some(entry.value)
            }
            Ok(_) => {
                debug!(partition = self.key, key, "Cache MISS");
                None
            }
            Err(e) => {
                warn!(partition = self.key, key, "Cache get failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        match self.cache.store.store(self.key, key, entry).await {
            Ok(()) => debug!(partition = self.key, key, ttl_secs = ttl.as_secs(), "Cache SET"),
            Err(e) => warn!(partition = self.key, key, "Cache set failed: {e}"),
        }
    }

    /// Removes the entry under `key`.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.cache.store.remove(self.key, key).await {
            warn!(partition = self.key, key, "Cache delete failed: {e}");
        }
    }

    /// Removes every entry whose key starts with `prefix`; `""` clears the partition.
    pub async fn clear_prefix(&self, prefix: &str) {
        match self.cache.store.remove_prefix(self.key, prefix).await {
            Ok(()) => debug!(
                partition = self.key,
                prefix = if prefix.is_empty() { "<all>" } else { prefix },
                "Cache CLEAR"
            ),
            Err(e) => warn!(partition = self.key, prefix, "Cache clear failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> PartitionedCache {
        PartitionedCache::in_memory(100)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_live_until_expiry() {
        let cache = cache();
        let partition = cache.partition(1);
        partition
            .set("tasks:list", json!({"code": 200}), Duration::from_secs(30))
            .await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(partition.get("tasks:list").await, Some(json!({"code": 200})));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(partition.get("tasks:list").await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = cache();
        let partition = cache.partition(1);
        partition.set("envs:list", json!(1), Duration::from_secs(60)).await;
        partition.set("envs:list", json!(2), Duration::from_secs(60)).await;
        assert_eq!(partition.get("envs:list").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let cache = cache();
        cache
            .partition(1)
            .set("tasks:list", json!("one"), Duration::from_secs(60))
            .await;
        cache
            .partition(2)
            .set("tasks:list", json!("two"), Duration::from_secs(60))
            .await;

        cache.partition(1).clear_prefix("").await;

        assert_eq!(cache.partition(1).get("tasks:list").await, None);
        assert_eq!(cache.partition(2).get("tasks:list").await, Some(json!("two")));
    }

    #[tokio::test]
    async fn test_clear_prefix_removes_list_and_details() {
        let cache = cache();
        let partition = cache.partition(7);
        let ttl = Duration::from_secs(60);
        partition.set("tasks:list", json!([]), ttl).await;
        partition.set("tasks:detail:3", json!({}), ttl).await;
        partition.set("envs:list", json!([]), ttl).await;

        partition.clear_prefix("tasks").await;

        assert_eq!(partition.get("tasks:list").await, None);
        assert_eq!(partition.get("tasks:detail:3").await, None);
        assert_eq!(partition.get("envs:list").await, Some(json!([])));
    }

    #[tokio::test]
    async fn test_delete_single_entry() {
        let cache = cache();
        let partition = cache.partition(7);
        partition.set("deps:linux", json!(1), Duration::from_secs(60)).await;
        partition.set("deps:nodejs", json!(2), Duration::from_secs(60)).await;

        partition.delete("deps:linux").await;
        partition.delete("deps:missing").await;

        assert_eq!(partition.get("deps:linux").await, None);
        assert_eq!(partition.get("deps:nodejs").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_backend_failures_degrade() {
        let mut store = MockCacheStore::new();
        store
            .expect_load()
            .returning(|_, _| Err(CacheError::Backend("down".to_string())));
        store
            .expect_store()
            .returning(|_, _, _| Err(CacheError::Backend("down".to_string())));
        store
            .expect_remove_prefix()
            .returning(|_, _| Err(CacheError::Backend("down".to_string())));

        let cache = PartitionedCache::new(Arc::new(store));
        let partition = cache.partition(1);
        partition.set("tasks:list", json!(1), Duration::from_secs(5)).await;
        partition.clear_prefix("tasks").await;
        assert_eq!(partition.get("tasks:list").await, None);
    }
}
