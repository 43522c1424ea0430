use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::{CacheError, CacheResult};
use crate::domain::DistributedCache;

/// A cached value together with the lifetime it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: Vec<u8>,
    pub ttl: Duration,
    expires_at: Instant,
}

/// An in-memory cache.
///
/// Useful for testing and development.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, StoredEntry>>,
    failing: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw entry, including its ttl, regardless of expiry.
    pub fn entry(&self, key: &str) -> Option<StoredEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Makes every write fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache rejected write".into()));
        }
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_vec(),
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_flow() {
        let cache = MemoryCache::new();
        cache
            .put("key", b"value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(cache.entry("key").unwrap().ttl, Duration::from_secs(60));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.put("key", b"value", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("key").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failing_cache() {
        let cache = MemoryCache::new();
        cache.set_failing(true);
        let result = cache.put("key", b"v", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
        assert!(cache.is_empty());
    }
}
