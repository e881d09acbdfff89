//! # Logging
//!
//! `tracing` subscriber setup. The filter comes from `RUST_LOG` when set,
//! otherwise from the `log-level` configuration key. Dev mode selects the
//! human-readable formatter; production emits JSON lines.

use crate::config::{ConfigError, ConfigStore};
use crate::constants::keys;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Default filter directive when neither `RUST_LOG` nor `log-level` is set
const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging settings read from the configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub dev_mode: bool,
}

impl LogSettings {
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            level: store.get_string_or(keys::LOG_LEVEL, DEFAULT_LOG_LEVEL)?,
            dev_mode: store.get_bool_or(keys::DEV_MODE, false)?,
        })
    }

    /// `RUST_LOG` wins over the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
        })
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(settings.env_filter());
    let installed = if settings.dev_mode {
        builder.pretty().try_init()
    } else {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemoryProvider;
    use std::sync::Arc;

    #[test]
    fn test_settings_default_to_json_at_info() {
        let store = ConfigStore::new();
        let settings = LogSettings::from_store(&store).unwrap();
        assert_eq!(
            settings,
            LogSettings {
                level: "info".to_string(),
                dev_mode: false
            }
        );
    }

    #[test]
    fn test_dev_mode_and_level_come_from_store() {
        let store = ConfigStore::new();
        store.register(
            0,
            Arc::new(InMemoryProvider::with_items(
                "test",
                vec![
                    ("dev-mode".to_string(), "true".to_string()),
                    ("log-level".to_string(), "harbor_operator=debug".to_string()),
                ],
            )),
        );
        let settings = LogSettings::from_store(&store).unwrap();
        assert!(settings.dev_mode);
        assert_eq!(settings.level, "harbor_operator=debug");
    }
}
