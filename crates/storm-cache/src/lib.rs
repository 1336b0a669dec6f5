//! # storm-cache
//!
//! Key-value cache service consumed by the Storm attachment layer.
//!
//! ## Features
//!
//! - **Multi-backend support**: in-memory LRU and Redis
//! - **TTL support**: time-based expiry, or no expiry at all (`put_forever`)
//! - **Async-first**: every backend operation is an `async fn`
//! - **Type-safe**: values are serialized with `serde_json`
//!
//! ## Quick Start
//!
//! ```rust
//! use storm_cache::{Cache, MemoryBackend, CacheConfig};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));
//!
//! cache.put("file_exists::uploads/a.png", &true, Duration::from_secs(3600)).await.unwrap();
//! let hit: Option<bool> = cache.get("file_exists::uploads/a.png").await.unwrap();
//! assert_eq!(hit, Some(true));
//!
//! // Entries written with `put_forever` never expire
//! cache.put_forever("file_exists::uploads/b.png", &true).await.unwrap();
//! # });
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),

    #[error("Timeout error")]
    Timeout,
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Core cache backend trait that all cache implementations must implement
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Put a value in the cache; `None` means the entry never expires
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a value from the cache
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists in the cache
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Clear all entries from the cache
    async fn flush(&self) -> CacheResult<()>;

    /// Remove multiple values from the cache
    async fn forget_many(&self, keys: &[&str]) -> CacheResult<usize> {
        let mut removed_count = 0;
        for key in keys {
            if self.forget(key).await? {
                removed_count += 1;
            }
        }
        Ok(removed_count)
    }

    /// Get cache statistics (if supported)
    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats::default())
    }
}

#[async_trait]
impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).put(key, value, ttl).await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        (**self).forget(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn flush(&self) -> CacheResult<()> {
        (**self).flush().await
    }

    async fn forget_many(&self, keys: &[&str]) -> CacheResult<usize> {
        (**self).forget_many(keys).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        (**self).stats().await
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
    pub memory_usage: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// High-level cache interface with type-safe operations
pub struct Cache<B: CacheBackend> {
    backend: B,
    default_ttl: Option<Duration>,
}

impl<B: CacheBackend> Cache<B> {
    /// Create a new cache instance with the given backend
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_ttl: None,
        }
    }

    /// Create a new cache instance with a default TTL
    pub fn with_default_ttl(backend: B, ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl: Some(ttl),
        }
    }

    /// Borrow the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get a typed value from the cache
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Put a typed value in the cache
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, Some(ttl)).await
    }

    /// Put a typed value in the cache using default TTL
    pub async fn put_default<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, self.default_ttl).await
    }

    /// Put a typed value that never expires
    pub async fn put_forever<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, None).await
    }

    /// Remove a value from the cache
    pub async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.backend.forget(key).await
    }

    /// Check if a key exists
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.backend.exists(key).await
    }

    /// Clear all cache entries
    pub async fn flush(&self) -> CacheResult<()> {
        self.backend.flush().await
    }

    /// Remember pattern: get from cache or compute and store
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }

        let value = compute().await;
        self.put(key, &value, ttl).await?;
        Ok(value)
    }

    /// Remember pattern without expiry
    pub async fn remember_forever<T, F, Fut>(&self, key: &str, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }

        let value = compute().await;
        self.put_forever(key, &value).await?;
        Ok(value)
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        self.backend.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));

        cache.put("test_key", &"test_value", Duration::from_secs(60)).await.unwrap();
        let value: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(value, Some("test_value".to_string()));

        assert!(cache.exists("test_key").await.unwrap());
        assert!(!cache.exists("nonexistent").await.unwrap());

        assert!(cache.forget("test_key").await.unwrap());
        let value: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_remember_forever_computes_once() {
        let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));

        use std::sync::atomic::{AtomicU32, Ordering};

        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let first: bool = cache
            .remember_forever("file_exists::a", move || {
                counter.fetch_add(1, Ordering::Relaxed);
                async { true }
            })
            .await
            .unwrap();
        assert!(first);

        let second: bool = cache
            .remember_forever("file_exists::a", || async { false })
            .await
            .unwrap();
        assert!(second);
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shared_backend_through_arc() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(CacheConfig::default()));
        let cache = Cache::new(backend.clone());

        cache.put_forever("shared", &42i32).await.unwrap();
        assert!(backend.exists("shared").await.unwrap());

        let value: Option<i32> = cache.get("shared").await.unwrap();
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_cache_with_default_ttl() {
        let backend = MemoryBackend::new(CacheConfig::default());
        let cache = Cache::with_default_ttl(backend, Duration::from_secs(3600));

        cache.put_default("default_ttl_test", &42i32).await.unwrap();
        let value: Option<i32> = cache.get("default_ttl_test").await.unwrap();
        assert_eq!(value, Some(42));
    }
}
