//! # Constants
//!
//! Shared constants and defaults for the Harbor operator.

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "harbor-operator";

/// Default label/annotation prefix of managed objects
pub const DEFAULT_OPERATOR_PREFIX: &str = "goharbor.io";

/// Default annotation carrying the operator class of a custom resource
pub const DEFAULT_CLASS_ANNOTATION: &str = "goharbor.io/harbor";

/// Pod template annotation holding the checksum of all ConfigMap/Secret dependencies
pub const DEPENDENCIES_CHECKSUM_ANNOTATION: &str = "goharbor.io/dependencies-checksum";

/// Default HTTP server port for metrics, probes and webhooks
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Prefix of the environment variables read by the configuration store
pub const ENV_PREFIX: &str = "HARBOR_OPERATOR";

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Base requeue delay after a transient failure (seconds)
pub const DEFAULT_REQUEUE_BASE_DELAY_SECS: u64 = 2;

/// Upper bound of the exponential requeue backoff (seconds)
pub const DEFAULT_REQUEUE_MAX_DELAY_SECS: u64 = 300;

/// Default number of concurrent reconciles per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 2;

/// Default polling interval of file-watched templates (seconds)
pub const DEFAULT_TEMPLATE_WATCH_INTERVAL_SECS: u64 = 5;

/// Watcher timeout (seconds), kept below the client read timeout
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Maximum length of a Kubernetes object name (DNS-1123 label)
pub const MAX_NAME_LENGTH: usize = 63;

/// Configuration store keys
pub mod keys {
    pub const HARBOR_CLASS: &str = "harbor-class";
    pub const CLASS_ANNOTATION: &str = "class-annotation";
    pub const OPERATOR_PREFIX: &str = "operator-label-prefix";
    pub const MAX_CONCURRENT_RECONCILES: &str = "reconciliation-max-concurrent";
    pub const REQUEUE_BASE_DELAY: &str = "reconciliation-requeue-base-delay";
    pub const REQUEUE_MAX_DELAY: &str = "reconciliation-requeue-max-delay";
    pub const TEMPLATE_WATCH_INTERVAL: &str = "template-watch-interval";
    pub const METRICS_PORT: &str = "metrics-port";
    pub const WATCH_NAMESPACE: &str = "watch-namespace";
    pub const DEV_MODE: &str = "dev-mode";
    pub const LOG_LEVEL: &str = "log-level";

    /// `<component>-template-path`
    pub fn template_path(component: &str) -> String {
        format!("{component}-template-path")
    }

    /// `<component>-template-content`, populated by the file-watched provider
    pub fn template_content(component: &str) -> String {
        format!("{component}-template-content")
    }

    /// `<component>-docker-image`
    pub fn docker_image(component: &str) -> String {
        format!("{component}-docker-image")
    }

    /// `<component>-controller-disabled`
    pub fn controller_disabled(component: &str) -> String {
        format!("{component}-controller-disabled")
    }

    /// `<component>-webhook-disabled`
    pub fn webhook_disabled(component: &str) -> String {
        format!("{component}-webhook-disabled")
    }

    /// `<component>-network-policies-enabled`
    pub fn network_policies_enabled(component: &str) -> String {
        format!("{component}-network-policies-enabled")
    }
}
