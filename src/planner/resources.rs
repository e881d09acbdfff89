//! Builders for the objects every planner emits.

use super::PlanContext;
use crate::constants::MAX_NAME_LENGTH;
use crate::crd::{ComponentSpec, RedisConnection, VolumeSourceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvFromSource,
    EnvVar, EnvVarSource, GRPCAction, HTTPGetAction, KeyToPath, PodSpec, PodTemplateSpec, Probe,
    Secret, SecretEnvSource, SecretKeySelector, SecretVolumeSource, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").expect("static regex"));

/// Object name for `name` and optional suffixes
///
/// Segments are joined with `-`, lower-cased and stripped of characters that
/// are not valid in a DNS-1123 label. Names longer than 63 characters are
/// truncated and suffixed with a short hash of the full name so they stay
/// unique.
pub fn normalize_name(name: &str, suffixes: &[&str]) -> String {
    let joined = std::iter::once(name)
        .chain(suffixes.iter().copied())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    let cleaned = INVALID_NAME_CHARS.replace_all(&joined, "-");
    let cleaned = cleaned.trim_matches('-');

    if cleaned.len() <= MAX_NAME_LENGTH {
        return cleaned.to_string();
    }

    let digest = Sha256::digest(cleaned.as_bytes());
    let hash: String = digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    let keep = MAX_NAME_LENGTH - hash.len() - 1;
    format!("{}-{hash}", cleaned[..keep].trim_end_matches('-'))
}

/// `redis://[:password@]host:port/db`
pub fn redis_url(connection: &RedisConnection, password: &str) -> String {
    if password.is_empty() {
        format!("redis://{}/{}", connection.address(), connection.database())
    } else {
        format!(
            "redis://:{password}@{}/{}",
            connection.address(),
            connection.database()
        )
    }
}

fn metadata(ctx: &PlanContext<'_>, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(ctx.namespace.clone()),
        labels: Some(ctx.labels()),
        ..ObjectMeta::default()
    }
}

/// Service port `name` exposing `port`, targeting the container port of the same name
pub fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::String(name.to_string())),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }
}

/// Public port of a component: `http` on 80, or `https` on 443 with TLS
pub fn public_port(tls: bool) -> ServicePort {
    if tls {
        service_port(HTTPS_PORT_NAME, 443)
    } else {
        service_port(HTTP_PORT_NAME, 80)
    }
}

pub const HTTP_PORT_NAME: &str = "http";
pub const HTTPS_PORT_NAME: &str = "https";

/// ClusterIP Service selecting the standard labels
pub fn service(ctx: &PlanContext<'_>, ports: Vec<ServicePort>) -> Service {
    Service {
        metadata: metadata(ctx, ctx.object_name()),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(ctx.labels()),
            ports: Some(ports),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Single-key ConfigMap holding a rendered configuration file
pub fn config_map(ctx: &PlanContext<'_>, key: &str, content: String) -> ConfigMap {
    ConfigMap {
        metadata: metadata(ctx, ctx.object_name()),
        data: Some(BTreeMap::from([(key.to_string(), content)])),
        ..ConfigMap::default()
    }
}

/// Operator-owned Secret holding derived values
pub fn derived_secret(ctx: &PlanContext<'_>, values: BTreeMap<String, String>) -> Secret {
    Secret {
        metadata: metadata(ctx, ctx.object_name()),
        type_: Some(super::secrets::secret_type::OPAQUE.to_string()),
        data: Some(
            values
                .into_iter()
                .map(|(key, value)| (key, ByteString(value.into_bytes())))
                .collect(),
        ),
        ..Secret::default()
    }
}

/// Ingress policy `<name>-ingress` admitting traffic on the named ports
pub fn ingress_policy(ctx: &PlanContext<'_>, port_names: &[&str]) -> NetworkPolicy {
    NetworkPolicy {
        metadata: metadata(ctx, ctx.object_name_with("ingress")),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(ctx.labels()),
                ..LabelSelector::default()
            }
            .into(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                ports: Some(
                    port_names
                        .iter()
                        .map(|name| NetworkPolicyPort {
                            port: Some(IntOrString::String((*name).to_string())),
                            protocol: Some("TCP".to_string()),
                            ..NetworkPolicyPort::default()
                        })
                        .collect(),
                ),
                ..NetworkPolicyIngressRule::default()
            }]),
            ..NetworkPolicySpec::default()
        }),
    }
}

/// HTTP(S) GET probe on `path` and `port`
pub fn http_probe(path: &str, port: i32, tls: bool, period_seconds: Option<i32>) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: Some(if tls { "HTTPS" } else { "HTTP" }.to_string()),
            ..HTTPGetAction::default()
        }),
        period_seconds,
        ..Probe::default()
    }
}

/// gRPC health probe on `port`
pub fn grpc_probe(port: i32) -> Probe {
    Probe {
        grpc: Some(GRPCAction {
            port,
            service: None,
        }),
        ..Probe::default()
    }
}

/// Plain environment variable
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..EnvVar::default()
    }
}

/// Environment variable read from `key` of secret `secret`
pub fn env_from_secret_key(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }
}

/// Export every key of `secret`, optionally prefixed
pub fn env_from_secret(secret: &str, prefix: Option<&str>) -> EnvFromSource {
    EnvFromSource {
        prefix: prefix.map(str::to_string),
        secret_ref: Some(SecretEnvSource {
            name: secret.to_string(),
            optional: Some(false),
        }),
        ..EnvFromSource::default()
    }
}

/// Volume projecting a ConfigMap
pub fn config_map_volume(volume: &str, config_map: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }
}

/// Volume projecting a Secret, optionally restricted to some keys
pub fn secret_volume(volume: &str, secret: &str, items: &[(&str, &str)]) -> Volume {
    Volume {
        name: volume.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            items: (!items.is_empty()).then(|| {
                items
                    .iter()
                    .map(|(key, path)| KeyToPath {
                        key: (*key).to_string(),
                        path: (*path).to_string(),
                        mode: None,
                    })
                    .collect()
            }),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    }
}

/// Volume from a user-declared source; emptyDir when none is set
pub fn volume_from_source(volume: &str, source: &VolumeSourceSpec) -> Volume {
    let mut result = Volume {
        name: volume.to_string(),
        ..Volume::default()
    };
    if let Some(pvc) = &source.persistent_volume_claim {
        result.persistent_volume_claim = Some(pvc.clone());
    } else if let Some(host_path) = &source.host_path {
        result.host_path = Some(host_path.clone());
    } else {
        result.empty_dir = Some(source.empty_dir.clone().unwrap_or_default());
    }
    result
}

pub fn mount(volume: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..VolumeMount::default()
    }
}

/// Mount a single key of a volume as a file
pub fn mount_file(volume: &str, path: &str, sub_path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        sub_path: Some(sub_path.to_string()),
        read_only: Some(true),
        ..VolumeMount::default()
    }
}

/// Single-container Deployment under construction
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    container: Container,
    volumes: Vec<Volume>,
}

impl DeploymentPlan {
    pub fn new(container_name: &str, image: String) -> Self {
        Self {
            container: Container {
                name: container_name.to_string(),
                image: Some(image),
                ..Container::default()
            },
            volumes: Vec::new(),
        }
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.container.command = Some(command);
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.container.args = Some(args);
        self
    }

    /// Named container port
    pub fn port(mut self, name: &str, port: i32) -> Self {
        self.container
            .ports
            .get_or_insert_with(Vec::new)
            .push(ContainerPort {
                name: Some(name.to_string()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..ContainerPort::default()
            });
        self
    }

    pub fn env(mut self, var: EnvVar) -> Self {
        self.container.env.get_or_insert_with(Vec::new).push(var);
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = EnvVar>) -> Self {
        self.container.env.get_or_insert_with(Vec::new).extend(vars);
        self
    }

    pub fn env_from(mut self, source: EnvFromSource) -> Self {
        self.container
            .env_from
            .get_or_insert_with(Vec::new)
            .push(source);
        self
    }

    /// Add a volume; `mounts` are added to the container
    pub fn volume(mut self, volume: Volume, mounts: impl IntoIterator<Item = VolumeMount>) -> Self {
        self.volumes.push(volume);
        self.container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(mounts);
        self
    }

    /// Same probe for liveness and readiness
    pub fn probe(self, probe: Probe) -> Self {
        self.probes(probe.clone(), probe)
    }

    pub fn probes(mut self, liveness: Probe, readiness: Probe) -> Self {
        self.container.liveness_probe = Some(liveness);
        self.container.readiness_probe = Some(readiness);
        self
    }

    /// Deployment with replicas, scheduling and image settings from `component`
    pub fn build(self, ctx: &PlanContext<'_>, component: &ComponentSpec) -> Deployment {
        let labels = ctx.labels();
        let mut container = self.container;
        container.image_pull_policy = component.image_pull_policy.clone();
        container.resources = component.resources.clone();

        Deployment {
            metadata: metadata(ctx, ctx.object_name()),
            spec: Some(DeploymentSpec {
                replicas: Some(component.replicas()),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        volumes: (!self.volumes.is_empty()).then_some(self.volumes),
                        automount_service_account_token: Some(false),
                        service_account_name: component.service_account_name.clone(),
                        image_pull_secrets: (!component.image_pull_secrets.is_empty())
                            .then(|| component.image_pull_secrets.clone()),
                        node_selector: (!component.node_selector.is_empty())
                            .then(|| component.node_selector.clone()),
                        tolerations: (!component.tolerations.is_empty())
                            .then(|| component.tolerations.clone()),
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("cm1", &[]), "cm1");
        assert_eq!(normalize_name("Core_1", &["ingress"]), "core-1-ingress");
        assert_eq!(normalize_name("a", &["", "b"]), "a-b");
    }

    #[test]
    fn test_normalize_long_name_is_truncated_and_unique() {
        let long_a = "a".repeat(80);
        let long_b = format!("{}b", "a".repeat(79));
        let a = normalize_name(&long_a, &[]);
        let b = normalize_name(&long_b, &[]);
        assert_eq!(a.len(), MAX_NAME_LENGTH);
        assert_eq!(b.len(), MAX_NAME_LENGTH);
        assert_ne!(a, b);
        assert_eq!(normalize_name(&long_a, &[]), a);
    }

    #[test]
    fn test_redis_url() {
        let connection = RedisConnection {
            host: "redis".to_string(),
            port: Some(6380),
            database: Some(1),
            password_ref: None,
        };
        assert_eq!(redis_url(&connection, ""), "redis://redis:6380/1");
        assert_eq!(redis_url(&connection, "pw"), "redis://:pw@redis:6380/1");
    }

    #[test]
    fn test_volume_from_source_defaults_to_empty_dir() {
        let volume = volume_from_source("data", &VolumeSourceSpec::default());
        assert!(volume.empty_dir.is_some());
        assert!(volume.persistent_volume_claim.is_none());
    }

    #[test]
    fn test_public_port_swaps_with_tls() {
        assert_eq!(public_port(false).name.as_deref(), Some("http"));
        assert_eq!(public_port(true).port, 443);
        assert_eq!(
            public_port(true).target_port,
            Some(IntOrString::String("https".to_string()))
        );
    }
}
