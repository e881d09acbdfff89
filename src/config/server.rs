//! # Server Configuration
//!
//! HTTP server settings read from the configuration store.

use super::error::ConfigError;
use super::store::ConfigStore;
use crate::constants::{self, keys};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port for metrics, health probes and webhooks
    pub metrics_port: u16,
    /// How long to wait for the server to be ready before giving up (seconds)
    pub startup_timeout_secs: u64,
    /// How often to check if the server is ready during startup (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: constants::DEFAULT_METRICS_PORT,
            startup_timeout_secs: constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: constants::DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load server settings, falling back to defaults for absent keys
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let port = store.get_int_or(keys::METRICS_PORT, i64::from(constants::DEFAULT_METRICS_PORT))?;
        let metrics_port = u16::try_from(port).map_err(|_overflow| ConfigError::Invalid {
            key: keys::METRICS_PORT.to_string(),
            value: port.to_string(),
            expected: "a TCP port",
        })?;
        Ok(Self {
            metrics_port,
            ..Self::default()
        })
    }
}
