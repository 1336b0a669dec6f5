//! In-memory cache backend with LRU eviction

use crate::{CacheBackend, CacheConfig, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Entry in the memory cache
#[derive(Debug)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
    last_used: AtomicU64,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>, tick: u64) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            last_used: AtomicU64::new(tick),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() > exp)
    }

    fn touch(&self, tick: u64) -> Vec<u8> {
        self.last_used.store(tick, Ordering::Relaxed);
        self.data.clone()
    }

    fn size(&self) -> usize {
        self.data.len() + std::mem::size_of::<Self>()
    }
}

/// In-memory cache backend with LRU eviction.
///
/// Recency is tracked with a monotonic use counter; the entry with the
/// smallest counter is evicted first once `max_entries` or `max_memory`
/// is reached.
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
    clock: AtomicU64,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl MemoryBackend {
    /// Create a new memory backend with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn memory_usage(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().size()).sum()
    }

    fn over_limits(&self) -> bool {
        if let Some(max_entries) = *self.config.get_max_entries() {
            if self.entries.len() >= max_entries {
                return true;
            }
        }

        if let Some(max_memory) = *self.config.get_max_memory() {
            if self.memory_usage() >= max_memory {
                return true;
            }
        }

        false
    }

    fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone())
    }

    /// Evict expired entries, then least recently used ones until under the limits
    fn evict(&self) {
        self.purge_expired();

        while self.over_limits() {
            match self.least_recently_used() {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        // Occasional sweep so expired entries that are never read again go away
        if rand::random::<f64>() < 0.01 {
            self.purge_expired();
        }

        let lookup = self.entries.get(key).map(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.touch(self.tick()))
            }
        });

        // The shard guard is released before removing an expired entry
        let hit = match lookup {
            Some(Some(data)) => Some(data),
            Some(None) => {
                self.entries.remove(key);
                None
            }
            None => None,
        };

        let mut stats = self.stats.lock();
        match hit {
            Some(data) => {
                stats.hits += 1;
                Ok(Some(data))
            }
            None => {
                stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if !self.entries.contains_key(key) && self.over_limits() {
            self.evict();
        }

        let entry = CacheEntry::new(value, ttl, self.tick());
        self.entries.insert(key.to_string(), entry);

        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(false),
        };

        if expired {
            self.entries.remove(key);
            return Ok(false);
        }

        Ok(true)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let stats = self.stats.lock();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            total_keys: self.entries.len() as u64,
            memory_usage: self.memory_usage() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_memory_backend_basic_operations() {
        let backend = MemoryBackend::new(CacheConfig::default());

        backend.put("test", b"value".to_vec(), Some(Duration::from_secs(60))).await.unwrap();
        let result = backend.get("test").await.unwrap();
        assert_eq!(result, Some(b"value".to_vec()));

        assert!(backend.exists("test").await.unwrap());
        assert!(!backend.exists("nonexistent").await.unwrap());

        assert!(backend.forget("test").await.unwrap());
        assert!(!backend.exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_backend_ttl() {
        let backend = MemoryBackend::new(CacheConfig::default());

        backend.put("ttl_test", b"value".to_vec(), Some(Duration::from_millis(50))).await.unwrap();
        assert!(backend.exists("ttl_test").await.unwrap());

        sleep(Duration::from_millis(100)).await;

        assert!(!backend.exists("ttl_test").await.unwrap());
        assert_eq!(backend.get("ttl_test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_without_ttl_do_not_expire() {
        let backend = MemoryBackend::new(CacheConfig::default());

        backend.put("forever", b"1".to_vec(), None).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        assert!(backend.exists("forever").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_backend_lru_eviction() {
        let config = CacheConfig::builder()
            .max_entries_limit(2)
            .build_with_defaults()
            .unwrap();
        let backend = MemoryBackend::new(config);

        backend.put("key1", b"value1".to_vec(), None).await.unwrap();
        backend.put("key2", b"value2".to_vec(), None).await.unwrap();

        // key1 becomes the most recently used entry
        backend.get("key1").await.unwrap();

        backend.put("key3", b"value3".to_vec(), None).await.unwrap();

        assert!(backend.exists("key1").await.unwrap());
        assert!(!backend.exists("key2").await.unwrap());
        assert!(backend.exists("key3").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_backend_stats() {
        let backend = MemoryBackend::new(CacheConfig::default());

        backend.put("test1", b"value1".to_vec(), None).await.unwrap();
        backend.put("test2", b"value2".to_vec(), None).await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_keys, 2);
        assert!(stats.memory_usage > 0);

        backend.get("test1").await.unwrap();
        backend.get("nonexistent").await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[tokio::test]
    async fn test_memory_backend_flush() {
        let backend = MemoryBackend::new(CacheConfig::default());

        backend.put("test1", b"value1".to_vec(), None).await.unwrap();
        backend.put("test2", b"value2".to_vec(), None).await.unwrap();

        backend.flush().await.unwrap();

        assert!(!backend.exists("test1").await.unwrap());
        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.memory_usage, 0);
    }
}
