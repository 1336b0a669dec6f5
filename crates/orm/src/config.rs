//! ORM configuration

use serde::{Deserialize, Serialize};
use service_builder::builder;

/// Settings shared by the persistence context and the deferred binding ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct OrmConfig {
    /// PostgreSQL connection string used by `PgStore::connect`
    #[builder(getter, default = "\"postgres://localhost/storm\".to_string()")]
    pub database_url: String,

    /// Pool size for `PgStore::connect`
    #[builder(getter, default = "10")]
    pub max_connections: u32,

    /// Table holding deferred binding rows
    #[builder(getter, default = "\"deferred_bindings\".to_string()")]
    pub deferred_table: String,

    /// Cache select results until a write through this context touches
    /// the table. Only safe when no other process writes the same tables.
    #[builder(getter, default = "false")]
    pub identity_cache: bool,

    /// Most select results the identity cache holds at once
    #[builder(getter, default = "1024")]
    pub identity_cache_capacity: usize,

    /// Age in days after which `clean_up` discards abandoned bindings
    #[builder(getter, default = "5")]
    pub binding_retention_days: i64,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/storm".to_string(),
            max_connections: 10,
            deferred_table: "deferred_bindings".to_string(),
            identity_cache: false,
            identity_cache_capacity: 1024,
            binding_retention_days: 5,
        }
    }
}

impl OrmConfig {
    /// Defaults overridden by `STORM_DATABASE_URL`, `STORM_MAX_CONNECTIONS`,
    /// `STORM_DEFERRED_TABLE`, `STORM_IDENTITY_CACHE`,
    /// `STORM_IDENTITY_CACHE_CAPACITY` and `STORM_BINDING_RETENTION_DAYS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("STORM_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(max) = env_parse::<u32>("STORM_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Ok(table) = std::env::var("STORM_DEFERRED_TABLE") {
            config.deferred_table = table;
        }
        if let Ok(flag) = std::env::var("STORM_IDENTITY_CACHE") {
            config.identity_cache = matches!(flag.trim(), "1" | "true" | "on" | "yes");
        }
        if let Some(capacity) = env_parse::<usize>("STORM_IDENTITY_CACHE_CAPACITY") {
            config.identity_cache_capacity = capacity;
        }
        if let Some(days) = env_parse::<i64>("STORM_BINDING_RETENTION_DAYS") {
            config.binding_retention_days = days;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

impl OrmConfigBuilder {
    pub fn with_identity_cache(self, capacity: usize) -> Self {
        self.identity_cache(true).identity_cache_capacity(capacity)
    }

    pub fn without_identity_cache(self) -> Self {
        self.identity_cache(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrmConfig::default();
        assert_eq!(config.deferred_table, "deferred_bindings");
        assert_eq!(config.binding_retention_days, 5);
        assert!(!config.identity_cache);
        assert_eq!(config.identity_cache_capacity, 1024);
    }

    #[test]
    fn test_builder() {
        let config = OrmConfig::builder()
            .deferred_table("pending_links".to_string())
            .with_identity_cache(64)
            .build_with_defaults()
            .unwrap();

        assert_eq!(config.get_deferred_table(), "pending_links");
        assert!(*config.get_identity_cache());
        assert_eq!(*config.get_identity_cache_capacity(), 64);
        assert_eq!(*config.get_max_connections(), 10);
    }
}
