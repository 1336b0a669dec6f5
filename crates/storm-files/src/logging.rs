//! Logging bootstrap for applications embedding the attachment layer

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Show the target (module path) of each event
    pub include_target: bool,
    /// Environment filter (supports filters like "storm_orm=debug,storm_files=info")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_target: true,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// JSON output at info level
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            include_target: true,
            env_filter: Some("storm_orm=info,storm_files=info,storm_storage=warn,storm_cache=warn".to_string()),
        }
    }

    /// Text output with ledger and attachment internals at debug level
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            include_target: true,
            env_filter: Some("storm_orm=debug,storm_files=debug,storm_storage=debug,storm_cache=info".to_string()),
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured filter.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter.as_deref().unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(env_filter))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_target(config.include_target)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).with_target(config.include_target))
            .try_init()?;
    }

    tracing::info!(
        target: "storm::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(LoggingConfig::production().json_format);
        assert_eq!(LoggingConfig::development().level, "debug");
        let config = LoggingConfig::default().with_env_filter("storm_files=trace");
        assert_eq!(config.env_filter.as_deref(), Some("storm_files=trace"));
    }
}
