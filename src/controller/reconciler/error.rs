//! # Reconciler Errors
//!
//! Failures that abort a reconcile pass before or after realization.
//!
//! Problems inside the pass (missing secrets, unready dependencies, rejected
//! writes) are reported through node outcomes and status conditions instead;
//! the errors below are what the controller's error policy sees.

use crate::config::ConfigError;
use crate::controller::cluster::is_retryable_kube_error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch {kind} {namespace}/{name}: {source}")]
    Fetch {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} {namespace}/{name} could not be decoded: {message}")]
    InvalidResource {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    #[error("failed to update status of {kind} {namespace}/{name}: {source}")]
    StatusUpdate {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ReconcilerError {
    /// Whether the key should be requeued with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::Fetch { source, .. } | ReconcilerError::StatusUpdate { source, .. } => {
                is_retryable_kube_error(source)
            }
            ReconcilerError::InvalidResource { .. } | ReconcilerError::Config(_) => false,
        }
    }

    /// Metric label
    pub fn retryable_label(&self) -> &'static str {
        if self.is_retryable() {
            "retryable"
        } else {
            "non-retryable"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_fetch_errors_follow_kube_classification() {
        let conflict = ReconcilerError::StatusUpdate {
            kind: "Core".to_string(),
            namespace: "ns".to_string(),
            name: "core1".to_string(),
            source: api_error(409),
        };
        assert!(conflict.is_retryable());

        let forbidden = ReconcilerError::Fetch {
            kind: "Core".to_string(),
            namespace: "ns".to_string(),
            name: "core1".to_string(),
            source: api_error(403),
        };
        assert!(!forbidden.is_retryable());
        assert_eq!(forbidden.retryable_label(), "non-retryable");
    }

    #[test]
    fn test_decode_failures_are_permanent() {
        let err = ReconcilerError::InvalidResource {
            kind: "Portal".to_string(),
            namespace: "ns".to_string(),
            name: "p".to_string(),
            message: "missing field `spec`".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("missing field"));
    }
}
