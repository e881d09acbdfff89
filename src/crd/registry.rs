//! # Registry
//!
//! OCI distribution registry and its sidecar controller (registryctl).

use super::common::{ComponentSpec, LogLevel, RedisConnection, TlsConfig, VolumeSourceSpec};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Registry",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "registry",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    pub http: RegistryHttpSpec,
    pub storage: RegistryStorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<RegistryAuthenticationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHttpSpec {
    /// Secret of type `goharbor.io/single-key` signing upload state
    pub secret_ref: String,
    #[serde(default)]
    pub relative_urls: bool,
}

/// Exactly one of `fileSystem` or `s3` is expected
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStorageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<RegistryFileSystemStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<RegistryS3Storage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFileSystemStorage {
    #[serde(default = "default_root_directory")]
    pub root_directory: String,
    #[serde(flatten)]
    pub volume: VolumeSourceSpec,
}

fn default_root_directory() -> String {
    "/storage".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryS3Storage {
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    /// Secret of type `goharbor.io/single-key` holding the S3 secret key
    pub secret_key_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<String>,
    #[serde(default = "default_true")]
    pub secure: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAuthenticationSpec {
    /// Secret of type `goharbor.io/htpasswd`
    pub htpasswd_ref: String,
    #[serde(default = "default_realm")]
    pub realm: String,
}

fn default_realm() -> String {
    "harbor-registry-basic-realm".to_string()
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "RegistryController",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "registryctl",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistryControllerSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    /// Name of the Registry resource whose configuration is shared
    pub registry_ref: String,
    /// Secret of type `goharbor.io/single-key` shared with core
    pub core_secret_ref: String,
    /// Secret of type `goharbor.io/single-key` shared with the jobservice
    pub jobservice_secret_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}
