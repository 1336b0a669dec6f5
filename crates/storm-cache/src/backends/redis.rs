//! Redis cache backend
//!
//! Shares existence-cache entries between processes, which the in-memory
//! backend cannot do.

use crate::{CacheBackend, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{debug, error};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Command timeout
    pub command_timeout: Duration,

    /// Key prefix for all cache keys
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            command_timeout: Duration::from_secs(1),
            key_prefix: "storm:".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Redis cache backend
pub struct RedisBackend {
    connection: ConnectionManager,
    config: RedisConfig,
    stats: Mutex<CacheStats>,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a PING
    pub async fn new(config: RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis client: {}", e)))?;

        let mut connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis ping failed: {}", e)))?;

        debug!("Redis connection established to {}", config.url);

        Ok(Self {
            connection,
            config,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    fn format_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> CacheResult<T> {
        let mut connection = self.connection.clone();

        tokio::time::timeout(self.config.command_timeout, cmd.query_async(&mut connection))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(|e| CacheError::Backend(format!("Redis operation failed: {}", e)))
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.format_key(key));

        let value: Option<Vec<u8>> = self.run(cmd).await.map_err(|e| {
            error!("Redis GET error for key '{}': {}", key, e);
            e
        })?;

        let mut stats = self.stats.lock();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.format_key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }

        self.run::<()>(cmd).await.map_err(|e| {
            error!("Redis SET error for key '{}': {}", key, e);
            e
        })
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.format_key(key));

        let removed: i64 = self.run(cmd).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(self.format_key(key));

        let count: i64 = self.run(cmd).await?;
        Ok(count > 0)
    }

    async fn flush(&self) -> CacheResult<()> {
        // Only keys under our prefix are removed
        let mut keys_cmd = redis::cmd("KEYS");
        keys_cmd.arg(format!("{}*", self.config.key_prefix));
        let keys: Vec<String> = self.run(keys_cmd).await?;

        if !keys.is_empty() {
            let mut del = redis::cmd("DEL");
            del.arg(keys);
            self.run::<()>(del).await?;
        }

        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.stats.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // requires a running Redis instance
    async fn test_redis_backend_basic_operations() {
        let config = RedisConfig::default().with_key_prefix("storm_test:");
        let backend = RedisBackend::new(config).await.unwrap();
        backend.flush().await.unwrap();

        backend.put("file_exists::a", b"true".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("file_exists::a").await.unwrap(), Some(b"true".to_vec()));
        assert!(backend.exists("file_exists::a").await.unwrap());

        assert!(backend.forget("file_exists::a").await.unwrap());
        assert!(!backend.exists("file_exists::a").await.unwrap());
    }

    #[test]
    fn test_redis_config_defaults() {
        let config = RedisConfig::default().with_url("redis://localhost:6380");
        assert_eq!(config.url, "redis://localhost:6380");
        assert_eq!(config.key_prefix, "storm:");
    }
}
