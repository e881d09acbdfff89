//! # ChartMuseum
//!
//! Helm chart repository backing Harbor's chart API.

use super::common::{ComponentSpec, LogLevel, RedisConnection, TlsConfig, VolumeSourceSpec};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ChartMuseum Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: goharbor.io/v1beta1
/// kind: ChartMuseum
/// metadata:
///   name: cm1
/// spec:
///   chart:
///     url: http://the.chartserver.url
///   storage:
///     fileSystem:
///       emptyDir: {}
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "ChartMuseum",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "chartmuseum",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChartMuseumSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    pub chart: ChartServerSpec,
    pub storage: ChartStorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ChartAuthenticationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<ChartCacheSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartServerSpec {
    /// External URL used to build chart download links
    pub url: String,
    /// Render absolute chart URLs in the index
    #[serde(default)]
    pub absolute_url: bool,
    /// Allow re-uploading an existing chart version
    #[serde(default = "default_true")]
    pub allow_overwrite: bool,
    /// Depth of the multitenant repository layout
    #[serde(default = "default_depth")]
    pub depth: i32,
}

fn default_true() -> bool {
    true
}

fn default_depth() -> i32 {
    1
}

/// Exactly one of `fileSystem` or `objectStore` is expected
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartStorageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<ChartFileSystemStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_store: Option<ChartObjectStoreStorage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartFileSystemStorage {
    #[serde(flatten)]
    pub volume: VolumeSourceSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartObjectStoreStorage {
    /// ChartMuseum storage backend: amazon, google, microsoft, alibaba, openstack or oracle
    pub kind: String,
    /// Secret whose keys (`STORAGE_*`) are exported as environment variables
    pub secret_ref: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartAuthenticationSpec {
    /// Secret of type `kubernetes.io/basic-auth`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_ref: Option<String>,
    /// Allow anonymous GET requests when basic auth is enabled
    #[serde(default)]
    pub anonymous_get: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartCacheSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConnection>,
}
