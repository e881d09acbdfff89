//! # JobService
//!
//! Harbor asynchronous job runner (replication, garbage collection, scans).

use super::common::{
    ComponentSpec, CredentialsRef, LogLevel, RedisConnection, TlsConfig, VolumeSourceSpec,
};
use super::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "JobService",
    group = "goharbor.io",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    shortname = "jobservice",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"InProgress", "type":"string", "jsonPath":".status.conditions[?(@.type==\"InProgress\")].status"}, {"name":"Failed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Failed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    pub core: JobServiceCoreSpec,
    /// Secret of type `goharbor.io/single-key` authenticating core callbacks
    pub secret_ref: String,
    pub registry: JobServiceRegistrySpec,
    pub worker_pool: WorkerPoolSpec,
    #[serde(default)]
    pub loggers: JobServiceLoggersSpec,
    #[serde(default)]
    pub job_loggers: JobServiceLoggersSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceCoreSpec {
    pub url: String,
    /// Secret of type `goharbor.io/single-key` shared with core
    pub secret_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceRegistrySpec {
    pub url: String,
    pub controller_url: String,
    pub credentials: CredentialsRef,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolSpec {
    #[serde(default = "default_workers")]
    pub workers: i32,
    pub redis: RedisConnection,
    /// Redis key namespace of the job queue
    #[serde(default = "default_redis_namespace")]
    pub namespace: String,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: i64,
}

fn default_workers() -> i32 {
    10
}

fn default_redis_namespace() -> String {
    "harbor_job_service_namespace".to_string()
}

fn default_idle_timeout() -> i64 {
    3600
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceLoggersSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<StdoutLoggerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileLoggerSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StdoutLoggerSpec {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileLoggerSpec {
    #[serde(default)]
    pub level: LogLevel,
    /// Days after which log files are swept
    #[serde(default = "default_sweeper_days")]
    pub sweeper_days: i32,
    #[serde(default)]
    pub volume: VolumeSourceSpec,
}

fn default_sweeper_days() -> i32 {
    14
}
