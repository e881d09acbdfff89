//! Per-pass inputs shared by every planner.

use super::resources::normalize_name;
use super::secrets;
use super::{default_image, PlanError};
use crate::config::ConfigStore;
use crate::constants::{keys, DEFAULT_OPERATOR_PREFIX};
use crate::controller::cluster::ClusterClient;
use crate::controller::ControllerUid;
use crate::crd::ComponentSpec;
use crate::template::{TemplateFunctions, TemplateRenderer};
use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Everything a planner may consult during one reconcile pass
#[derive(Debug)]
pub struct PlanContext<'a> {
    pub cluster: &'a dyn ClusterClient,
    pub store: &'a ConfigStore,
    pub renderer: &'a TemplateRenderer,
    pub cancel: &'a CancellationToken,
    /// Namespace of the custom resource
    pub namespace: String,
    /// Name of the custom resource
    pub name: String,
}

impl PlanContext<'_> {
    /// Prefix of the standard labels
    pub fn label_prefix(&self) -> String {
        self.store
            .get_string_or(keys::OPERATOR_PREFIX, DEFAULT_OPERATOR_PREFIX)
            .unwrap_or_else(|_| DEFAULT_OPERATOR_PREFIX.to_string())
    }

    /// Name of the primary objects (Service, ConfigMap, Deployment)
    pub fn object_name(&self) -> String {
        normalize_name(&self.name, &[])
    }

    /// Name of a secondary object, `<name>-<suffix>`
    pub fn object_name_with(&self, suffix: &str) -> String {
        normalize_name(&self.name, &[suffix])
    }

    /// Standard labels; also the Service and Deployment selector
    pub fn labels(&self) -> BTreeMap<String, String> {
        standard_labels(&self.label_prefix(), &self.object_name(), &self.namespace)
    }

    /// Image precedence: resource spec, then `<uid>-docker-image`, then built-in
    pub fn image(&self, uid: ControllerUid, component: &ComponentSpec) -> Result<String, PlanError> {
        if let Some(image) = component.image.as_ref().filter(|image| !image.is_empty()) {
            return Ok(image.clone());
        }
        Ok(self
            .store
            .get_string_or(&keys::docker_image(uid.as_str()), default_image(uid))?)
    }

    /// Whether the ingress NetworkPolicy is planned for `uid`
    pub fn network_policies_enabled(&self, uid: ControllerUid) -> Result<bool, PlanError> {
        Ok(self
            .store
            .get_bool_or(&keys::network_policies_enabled(uid.as_str()), false)?)
    }

    /// Read a referenced secret and check its declared type
    ///
    /// A missing secret is retryable; a wrong type is not.
    pub async fn read_secret(&self, name: &str, expected_type: &str) -> Result<Secret, PlanError> {
        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }
        let secret = self
            .cluster
            .get_secret(&self.namespace, name)
            .await?
            .ok_or_else(|| PlanError::SecretNotFound {
                name: name.to_string(),
            })?;
        secrets::check_type(&secret, expected_type)?;
        Ok(secret)
    }

    /// Read one value of a referenced secret
    pub async fn read_secret_value(
        &self,
        name: &str,
        expected_type: &str,
        key: &str,
    ) -> Result<String, PlanError> {
        let secret = self.read_secret(name, expected_type).await?;
        secrets::string_value(&secret, key)
    }

    /// Render the component template against `spec` plus `extra` fields
    ///
    /// The context always carries `name`, `namespace` and `spec`.
    pub fn render<S: Serialize>(
        &self,
        uid: ControllerUid,
        spec: &S,
        extra: Value,
        functions: TemplateFunctions,
    ) -> Result<String, PlanError> {
        let spec = serde_json::to_value(spec).map_err(|e| PlanError::InvalidSpec {
            field: "spec",
            message: e.to_string(),
        })?;
        let mut context = Map::new();
        context.insert("name".to_string(), Value::String(self.object_name()));
        context.insert("namespace".to_string(), Value::String(self.namespace.clone()));
        context.insert("spec".to_string(), spec);
        if let Value::Object(extra) = extra {
            context.extend(extra);
        }
        Ok(self
            .renderer
            .render(uid, &Value::Object(context), functions)?)
    }
}

/// `<prefix>/name` and `<prefix>/namespace`
pub fn standard_labels(prefix: &str, name: &str, namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (format!("{prefix}/name"), name.to_string()),
        (format!("{prefix}/namespace"), namespace.to_string()),
    ])
}
