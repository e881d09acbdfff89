//! # Environment Provider
//!
//! Maps configuration keys onto environment variables:
//! `reconciliation-max-concurrent` is read from `RECONCILIATION_MAX_CONCURRENT`,
//! or `<PREFIX>_RECONCILIATION_MAX_CONCURRENT` when a prefix is configured.

use super::store::ConfigProvider;

#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: Option<String>,
}

impl EnvProvider {
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix
                .filter(|p| !p.is_empty())
                .map(|p| p.trim_end_matches('_').to_ascii_uppercase()),
        }
    }

    /// Environment variable name for a configuration key
    pub fn variable_name(&self, key: &str) -> String {
        let normalized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{normalized}"),
            None => normalized,
        }
    }
}

impl ConfigProvider for EnvProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_name_without_prefix() {
        let provider = EnvProvider::new(None);
        assert_eq!(
            provider.variable_name("reconciliation-max-concurrent"),
            "RECONCILIATION_MAX_CONCURRENT"
        );
    }

    #[test]
    fn test_variable_name_with_prefix() {
        let provider = EnvProvider::new(Some("harbor_"));
        assert_eq!(provider.variable_name("core-docker-image"), "HARBOR_CORE_DOCKER_IMAGE");
    }

    #[test]
    fn test_reads_process_environment() {
        let provider = EnvProvider::new(Some("HARBOR_ENV_PROVIDER_TEST"));
        std::env::set_var("HARBOR_ENV_PROVIDER_TEST_DEV_MODE", "true");
        assert_eq!(provider.get("dev-mode").as_deref(), Some("true"));
        assert_eq!(provider.get("log-level"), None);
        std::env::remove_var("HARBOR_ENV_PROVIDER_TEST_DEV_MODE");
    }
}
