//! # Trivy
//!
//! Vulnerability scanner adapter.

use super::common::{ComponentSpec, LogLevel, RedisConnection, TlsConfig, VolumeSourceSpec};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Trivy",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "trivy",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrivySpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    pub redis: RedisConnection,
    #[serde(default)]
    pub update: TrivyUpdateSpec,
    #[serde(default)]
    pub server: TrivyServerSpec,
    #[serde(default)]
    pub storage: TrivyStorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrivyUpdateSpec {
    /// Do not download the vulnerability database
    #[serde(default)]
    pub skip: bool,
    /// Secret of type `goharbor.io/github` raising the GitHub rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrivyServerSpec {
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub offline_scan: bool,
    #[serde(default)]
    pub ignore_unfixed: bool,
    /// Comma-separated severities to report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Scan timeout, Go duration syntax
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrivyStorageSpec {
    #[serde(default)]
    pub cache: VolumeSourceSpec,
    #[serde(default)]
    pub reports: VolumeSourceSpec,
}
