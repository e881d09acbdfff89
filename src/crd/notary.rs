//! # Notary
//!
//! Content trust: NotaryServer (TUF metadata API) and NotarySigner (key
//! management, gRPC behind mutual TLS).

use super::common::{ComponentSpec, LogLevel, PostgresConnection, TlsConfig};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Port the notary signer serves gRPC on
pub const NOTARY_SIGNER_PORT: i32 = 7899;

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "NotaryServer",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "notaryserver",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NotaryServerSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    pub storage: NotaryStorageSpec,
    /// Run database migrations before starting. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_enabled: Option<bool>,
    pub trust_service: NotaryTrustServiceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<NotaryAuthenticationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "NotarySigner",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "notarysigner",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NotarySignerSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default)]
    pub log: LogLevel,
    pub storage: NotarySignerStorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_enabled: Option<bool>,
    /// gRPC server certificate
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotaryStorageSpec {
    pub postgres: PostgresConnection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotarySignerStorageSpec {
    pub postgres: PostgresConnection,
    /// Secret whose keys are exported with prefix `NOTARY_SIGNER_`
    /// (for example `DEFAULTALIAS` and the matching passphrase)
    pub aliases_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotaryTrustServiceSpec {
    pub remote: NotaryRemoteSigner,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotaryRemoteSigner {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Secret of type `kubernetes.io/tls` presenting the signer CA
    pub certificate_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotaryAuthenticationSpec {
    pub token: NotaryTokenAuthSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotaryTokenAuthSpec {
    pub realm: String,
    #[serde(default = "default_token_service")]
    pub service: String,
    #[serde(default = "default_token_issuer")]
    pub issuer: String,
    /// Secret of type `kubernetes.io/tls` whose certificate verifies tokens
    pub certificate_ref: String,
}

fn default_token_service() -> String {
    "harbor-notary".to_string()
}

fn default_token_issuer() -> String {
    "harbor-token-issuer".to_string()
}
