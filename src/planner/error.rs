//! Planner errors and their retry classification.

use crate::config::ConfigError;
use crate::controller::cluster::is_retryable_kube_error;
use crate::controller::ControllerUid;
use crate::graph::GraphError;
use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{actual} resource dispatched to the {expected} planner")]
    WrongResourceType {
        expected: ControllerUid,
        actual: ControllerUid,
    },

    #[error("secret {name} not found")]
    SecretNotFound { name: String },

    #[error("secret {name} has type {actual}, expected {expected}")]
    SecretTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("secret {name} has no key {key}")]
    SecretKeyMissing { name: String, key: String },

    #[error("invalid spec field {field}: {message}")]
    InvalidSpec { field: &'static str, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cluster request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("reconcile cancelled")]
    Cancelled,
}

impl PlanError {
    /// Whether a later pass may succeed without the resource changing
    pub fn is_retryable(&self) -> bool {
        match self {
            // The user may still create or fill the secret
            PlanError::SecretNotFound { .. }
            | PlanError::SecretKeyMissing { .. }
            | PlanError::Cancelled => true,
            PlanError::Kube(e) => is_retryable_kube_error(e),
            PlanError::WrongResourceType { .. }
            | PlanError::SecretTypeMismatch { .. }
            | PlanError::InvalidSpec { .. }
            | PlanError::Template(_)
            | PlanError::Graph(_)
            | PlanError::Config(_) => false,
        }
    }

    /// Condition reason
    pub fn reason(&self) -> &'static str {
        match self {
            PlanError::WrongResourceType { .. } => "WrongResourceType",
            PlanError::SecretNotFound { .. } => "SecretNotFound",
            PlanError::SecretTypeMismatch { .. } => "SecretTypeMismatch",
            PlanError::SecretKeyMissing { .. } => "SecretKeyMissing",
            PlanError::InvalidSpec { .. } => "InvalidSpec",
            PlanError::Template(_) => "TemplateError",
            PlanError::Graph(_) => "InvalidGraph",
            PlanError::Config(_) => "ConfigurationError",
            PlanError::Kube(_) => "ClusterError",
            PlanError::Cancelled => "Cancelled",
        }
    }
}
