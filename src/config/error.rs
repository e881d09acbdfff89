//! # Configuration Errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the configuration store and its providers
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No provider knows the key. Callers discriminate this to supply defaults.
    #[error("configuration key '{key}' not found")]
    NotFound { key: String },

    /// The key exists but its value cannot be converted to the requested type
    #[error("configuration key '{key}' has invalid value '{value}': expected {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },

    /// A watched file could not be read
    #[error("failed to read watched file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A reload callback rejected the file content
    #[error("reload callback for {path} failed: {message}")]
    Callback { path: PathBuf, message: String },
}

impl ConfigError {
    /// Whether this error means "key absent" rather than "key broken"
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound { .. })
    }
}
