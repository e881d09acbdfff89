//! # Operator Configuration
//!
//! Layered key/value configuration shared by every controller.
//!
//! Providers are registered with a priority; the highest-priority provider that
//! knows a key wins. The operator registers, from lowest to highest priority:
//!
//! - static in-memory defaults
//! - file-watched template files (hot-reloaded)
//! - the process environment, under the `HARBOR_OPERATOR_` prefix
//! - command-line flags
//!
//! Consumers never read files or environment variables directly; they always
//! query the [`ConfigStore`].

mod env;
mod error;
mod file;
mod memory;
mod server;
mod store;

pub use env::EnvProvider;
pub use error::ConfigError;
pub use file::{template_callback, ConfigItem, FileWatchProvider, ReloadCallback, WatchHandle};
pub use memory::InMemoryProvider;
pub use server::ServerConfig;
pub use store::{ConfigProvider, ConfigStore};

use crate::constants::{self, keys};
use std::sync::Arc;

/// Priority of the in-memory defaults provider
pub const DEFAULTS_PRIORITY: i32 = 0;
/// Priority of the file-watched templates provider
pub const FILE_PRIORITY: i32 = 50;
/// Priority of the environment provider
pub const ENV_PRIORITY: i32 = 100;
/// Priority of the command-line provider
pub const COMMAND_LINE_PRIORITY: i32 = 200;

/// Shared configuration store handle
pub type SharedConfigStore = Arc<ConfigStore>;

/// Built-in defaults registered at the lowest priority
pub fn default_items() -> Vec<(String, String)> {
    vec![
        (keys::HARBOR_CLASS.to_string(), String::new()),
        (
            keys::CLASS_ANNOTATION.to_string(),
            constants::DEFAULT_CLASS_ANNOTATION.to_string(),
        ),
        (
            keys::OPERATOR_PREFIX.to_string(),
            constants::DEFAULT_OPERATOR_PREFIX.to_string(),
        ),
        (
            keys::MAX_CONCURRENT_RECONCILES.to_string(),
            constants::DEFAULT_MAX_CONCURRENT_RECONCILES.to_string(),
        ),
        (
            keys::REQUEUE_BASE_DELAY.to_string(),
            constants::DEFAULT_REQUEUE_BASE_DELAY_SECS.to_string(),
        ),
        (
            keys::REQUEUE_MAX_DELAY.to_string(),
            constants::DEFAULT_REQUEUE_MAX_DELAY_SECS.to_string(),
        ),
        (
            keys::TEMPLATE_WATCH_INTERVAL.to_string(),
            constants::DEFAULT_TEMPLATE_WATCH_INTERVAL_SECS.to_string(),
        ),
        (
            keys::METRICS_PORT.to_string(),
            constants::DEFAULT_METRICS_PORT.to_string(),
        ),
        (keys::DEV_MODE.to_string(), "false".to_string()),
        (keys::LOG_LEVEL.to_string(), "info".to_string()),
    ]
}

/// Build the operator store: defaults, file-watched templates and environment
///
/// Returns the store together with the defaults provider and the file
/// provider (so template watches can be registered by the controller setup).
pub fn build_store(
    env_prefix: Option<&str>,
) -> (SharedConfigStore, Arc<InMemoryProvider>, Arc<FileWatchProvider>) {
    let store = Arc::new(ConfigStore::new());

    let defaults = Arc::new(InMemoryProvider::with_items("defaults", default_items()));
    let files = Arc::new(FileWatchProvider::new("templates"));
    let environment = Arc::new(EnvProvider::new(env_prefix));

    store.register(DEFAULTS_PRIORITY, Arc::<InMemoryProvider>::clone(&defaults));
    store.register(FILE_PRIORITY, Arc::<FileWatchProvider>::clone(&files));
    store.register(ENV_PRIORITY, environment);

    (store, defaults, files)
}

/// Register command-line flags above every other provider
pub fn register_overrides<K, V>(
    store: &ConfigStore,
    overrides: impl IntoIterator<Item = (K, V)>,
) -> Arc<InMemoryProvider>
where
    K: Into<String>,
    V: Into<String>,
{
    let items = overrides
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();
    let provider = Arc::new(InMemoryProvider::with_items("command-line", items));
    store.register(COMMAND_LINE_PRIORITY, Arc::<InMemoryProvider>::clone(&provider));
    provider
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprefixed_service_link_variable_is_ignored() {
        // Kubernetes injects this for a Service named `metrics`
        std::env::set_var("METRICS_PORT", "tcp://10.0.0.1:8080");
        let (store, _defaults, _files) = build_store(Some(constants::ENV_PREFIX));

        let server = ServerConfig::from_store(&store).unwrap();
        assert_eq!(server.metrics_port, constants::DEFAULT_METRICS_PORT);
        std::env::remove_var("METRICS_PORT");
    }

    #[test]
    fn test_prefixed_environment_overrides_files_and_defaults() {
        let (store, defaults, files) = build_store(Some("CONFIG_LAYER_TEST_ENV"));
        defaults.set(keys::LOG_LEVEL, "info");
        defaults.set("core-template-content", "from defaults");
        assert_eq!(store.get_string(keys::LOG_LEVEL).unwrap(), "info");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.tmpl");
        std::fs::write(&path, "from file").unwrap();
        files.watch(&path, template_callback("core")).unwrap();
        assert_eq!(
            store.get_string("core-template-content").unwrap(),
            "from file"
        );

        std::env::set_var("CONFIG_LAYER_TEST_ENV_LOG_LEVEL", "debug");
        std::env::set_var("CONFIG_LAYER_TEST_ENV_CORE_TEMPLATE_CONTENT", "from env");
        assert_eq!(store.get_string(keys::LOG_LEVEL).unwrap(), "debug");
        assert_eq!(
            store.get_string("core-template-content").unwrap(),
            "from env"
        );
        std::env::remove_var("CONFIG_LAYER_TEST_ENV_LOG_LEVEL");
        std::env::remove_var("CONFIG_LAYER_TEST_ENV_CORE_TEMPLATE_CONTENT");
    }

    #[test]
    fn test_command_line_overrides_environment() {
        let (store, _defaults, _files) = build_store(Some("CONFIG_LAYER_TEST_CLI"));
        std::env::set_var("CONFIG_LAYER_TEST_CLI_METRICS_PORT", "7070");
        assert_eq!(ServerConfig::from_store(&store).unwrap().metrics_port, 7070);

        register_overrides(&store, [(keys::METRICS_PORT, "9090")]);
        assert_eq!(ServerConfig::from_store(&store).unwrap().metrics_port, 9090);
        std::env::remove_var("CONFIG_LAYER_TEST_CLI_METRICS_PORT");
    }
}
