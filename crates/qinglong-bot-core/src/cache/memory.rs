use super::{CacheEntry, CacheError, CacheStore, PartitionKey};
use crate::config::CACHE_HYGIENE_TTL;
use async_trait::async_trait;
use moka::future::Cache;

/// Process-local partition store backed by moka.
///
/// moka's own TTL only bounds memory; per-entry expiry is enforced on read.
pub struct MemoryCacheStore {
    entries: Cache<(PartitionKey, String), CacheEntry>,
}

impl MemoryCacheStore {
    /// Create a store holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(CACHE_HYGIENE_TTL)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(
        &self,
        partition: PartitionKey,
        key: &str,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(&(partition, key.to_string())).await)
    }

    async fn store(
        &self,
        partition: PartitionKey,
        key: &str,
        entry: CacheEntry,
    ) -> Result<(), CacheError> {
        self.entries.insert((partition, key.to_string()), entry).await;
        Ok(())
    }

    async fn remove(&self, partition: PartitionKey, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(&(partition, key.to_string())).await;
        Ok(())
    }

    async fn remove_prefix(
        &self,
        partition: PartitionKey,
        prefix: &str,
    ) -> Result<(), CacheError> {
        let doomed: Vec<(PartitionKey, String)> = self
            .entries
            .iter()
            .filter(|(k, _)| k.0 == partition && k.1.starts_with(prefix))
            .map(|(k, _)| (*k).clone())
            .collect();
        for key in &doomed {
            self.entries.invalidate(key).await;
        }
        Ok(())
    }
}
