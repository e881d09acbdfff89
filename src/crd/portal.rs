//! # Portal
//!
//! Harbor web UI served by nginx.

use super::common::{ComponentSpec, TlsConfig};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Portal",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "portal",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PortalSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}
