//! Cache configuration and builder

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::time::Duration;

/// Cache configuration for all backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct CacheConfig {
    /// Default TTL for cache entries
    #[builder(getter, default = "Some(Duration::from_secs(3600))")]
    pub default_ttl: Option<Duration>,

    /// Maximum number of entries (for memory backend)
    #[builder(getter, default = "Some(10_000)")]
    pub max_entries: Option<usize>,

    /// Memory limit in bytes (for memory backend)
    #[builder(getter, default = "Some(100 * 1024 * 1024)")]
    pub max_memory: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(3600)),
            max_entries: Some(10_000),
            max_memory: Some(100 * 1024 * 1024),
        }
    }
}

impl CacheConfig {
    /// Read overrides from `STORM_CACHE_TTL`, `STORM_CACHE_MAX_ENTRIES` and
    /// `STORM_CACHE_MAX_MEMORY`; unset or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ttl) = env_number::<u64>("STORM_CACHE_TTL") {
            config.default_ttl = if ttl == 0 { None } else { Some(Duration::from_secs(ttl)) };
        }
        if let Some(max) = env_number::<usize>("STORM_CACHE_MAX_ENTRIES") {
            config.max_entries = if max == 0 { None } else { Some(max) };
        }
        if let Some(bytes) = env_number::<usize>("STORM_CACHE_MAX_MEMORY") {
            config.max_memory = if bytes == 0 { None } else { Some(bytes) };
        }

        config
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

// Add convenience methods to the generated builder
impl CacheConfigBuilder {
    pub fn default_ttl_duration(self, ttl: Duration) -> Self {
        self.default_ttl(Some(ttl))
    }

    pub fn no_default_ttl(self) -> Self {
        self.default_ttl(None)
    }

    pub fn max_entries_limit(self, max: usize) -> Self {
        self.max_entries(Some(max))
    }

    pub fn unlimited_memory(self) -> Self {
        self.max_memory(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.max_entries, Some(10_000));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .default_ttl_duration(Duration::from_secs(7200))
            .max_entries_limit(5000)
            .unlimited_memory()
            .build_with_defaults()
            .unwrap();

        assert_eq!(config.default_ttl, Some(Duration::from_secs(7200)));
        assert_eq!(config.max_entries, Some(5000));
        assert_eq!(config.max_memory, None);
    }

    #[test]
    fn test_getters() {
        let config = CacheConfig::builder()
            .max_entries_limit(12)
            .build_with_defaults()
            .unwrap();

        assert_eq!(config.get_max_entries(), &Some(12));
        assert_eq!(config.get_default_ttl(), &Some(Duration::from_secs(3600)));
        assert_eq!(config.get_max_memory(), &Some(100 * 1024 * 1024));
    }
}
