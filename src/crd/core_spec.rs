//! # Core
//!
//! Harbor core API server.

use super::common::{
    ComponentSpec, CredentialsRef, LogLevel, PostgresConnection, RedisConnection, TlsConfig,
};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Core",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "core",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CoreSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    /// Public URL of the Harbor installation
    pub external_endpoint: String,
    /// Secret of type `goharbor.io/single-key` shared with the other components
    pub secret_ref: String,
    pub token_service: CoreTokenServiceSpec,
    pub jobservice: CoreJobServiceSpec,
    pub components: CoreComponentsSpec,
    pub database: CoreDatabaseSpec,
    pub redis: CoreRedisSpec,
    /// Secret of type `goharbor.io/single-key` holding the CSRF key
    pub csrf_key_ref: String,
    /// Secret of type `goharbor.io/single-key` holding the initial admin password
    pub admin_initial_password_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreTokenServiceSpec {
    /// URL of the token service; defaults to `<externalEndpoint>/service/token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Secret of type `kubernetes.io/tls` used to sign tokens
    pub certificate_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreJobServiceSpec {
    pub url: String,
    /// Secret of type `goharbor.io/single-key` shared with the jobservice
    pub secret_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreComponentsSpec {
    pub portal_url: String,
    pub registry: CoreRegistrySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trivy_adapter_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notary_server_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreRegistrySpec {
    pub url: String,
    pub controller_url: String,
    pub credentials: CredentialsRef,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreDatabaseSpec {
    #[serde(flatten)]
    pub connection: PostgresConnection,
    /// Secret of type `goharbor.io/single-key` holding the field encryption key
    pub encryption_key_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_connections: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_open_connections: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreRedisSpec {
    /// Redis used for web sessions
    #[serde(flatten)]
    pub connection: RedisConnection,
    /// Idle timeout of pooled connections (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_seconds: Option<i64>,
    /// Redis used for the registry cache; defaults to the session Redis on database 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_cache: Option<RedisConnection>,
}
