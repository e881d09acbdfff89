//! # Layered Store
//!
//! Priority-ordered lookup over registered providers, with typed getters.

use super::error::ConfigError;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A source of configuration values
pub trait ConfigProvider: Send + Sync + fmt::Debug {
    /// Provider name, used in logs
    fn name(&self) -> &str;

    /// Look up a raw value
    fn get(&self, key: &str) -> Option<String>;
}

#[derive(Debug)]
struct Registration {
    priority: i32,
    provider: Arc<dyn ConfigProvider>,
}

/// Layered key/value store
///
/// Higher-priority providers override lower ones. Registration happens at
/// setup time; lookups are read-mostly and may run from any reconcile task.
#[derive(Debug, Default)]
pub struct ConfigStore {
    providers: RwLock<Vec<Registration>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Among equal priorities, the latest registration wins.
    pub fn register(&self, priority: i32, provider: Arc<dyn ConfigProvider>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(provider = provider.name(), priority, "registering config provider");
        providers.push(Registration { priority, provider });
        // Stable sort keeps registration order among equal priorities; reverse
        // iteration in `get_raw` then prefers the most recent one.
        providers.sort_by_key(|registration| registration.priority);
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers
            .iter()
            .rev()
            .find_map(|registration| registration.provider.get(key))
    }

    /// Raw string value
    pub fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get_raw(key).ok_or_else(|| ConfigError::NotFound {
            key: key.to_string(),
        })
    }

    /// Integer value
    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|_parse_error| ConfigError::Invalid {
                key: key.to_string(),
                value,
                expected: "an integer",
            })
    }

    /// Boolean value. Accepts true/false, yes/no, on/off and 1/0 (case-insensitive).
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.get_string(key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
                expected: "a boolean",
            }),
        }
    }

    /// String value, or `default` when the key is absent
    pub fn get_string_or(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        match self.get_string(key) {
            Err(e) if e.is_not_found() => Ok(default.to_string()),
            other => other,
        }
    }

    /// Integer value, or `default` when the key is absent
    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get_int(key) {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }

    /// Boolean value, or `default` when the key is absent
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_bool(key) {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }
}
