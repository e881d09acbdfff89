//! # Realization
//!
//! Walks a planned graph in topological order and converges the cluster onto
//! it, one node at a time.
//!
//! A node runs only when all of its dependencies are ready. Nodes behind an
//! unready dependency are reported as blocked instead of being skipped
//! silently, so the status can name exactly what the pass is waiting for.
//! Managed objects that already contain every planned field are left alone;
//! anything else is written with server-side apply.

use super::readiness::{self, Readiness};
use crate::constants::DEPENDENCIES_CHECKSUM_ANNOTATION;
use crate::controller::cluster::{is_retryable_kube_error, ClusterClient};
use crate::graph::{ExternalSecretRef, Node, NodeId, NodeKind, NodeObject, ResourceGraph};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of realizing one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Not attempted, or an external secret that does not exist yet
    Pending { reason: String },
    /// Present in the cluster but not ready
    Applied { detail: String },
    Ready,
    /// Not attempted because dependencies are not ready
    Blocked { waiting_on: Vec<String> },
    Failed { retryable: bool, message: String },
}

impl NodeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, NodeOutcome::Ready)
    }

    /// A failure no retry can fix
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            NodeOutcome::Failed {
                retryable: false,
                ..
            }
        )
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            NodeOutcome::Pending { .. } => "pending",
            NodeOutcome::Applied { .. } => "applied",
            NodeOutcome::Ready => "ready",
            NodeOutcome::Blocked { .. } => "blocked",
            NodeOutcome::Failed { .. } => "failed",
        }
    }

    /// Condition message fragment
    pub fn describe(&self) -> String {
        match self {
            NodeOutcome::Pending { reason } => reason.clone(),
            NodeOutcome::Applied { detail } => detail.clone(),
            NodeOutcome::Ready => "ready".to_string(),
            NodeOutcome::Blocked { waiting_on } => {
                format!("waiting for {}", waiting_on.join(", "))
            }
            NodeOutcome::Failed { message, .. } => message.clone(),
        }
    }

    fn from_readiness(readiness: Readiness) -> Self {
        match readiness {
            Readiness::Ready => NodeOutcome::Ready,
            Readiness::NotReady(detail) => NodeOutcome::Applied { detail },
        }
    }

    fn from_kube_error(error: &kube::Error) -> Self {
        NodeOutcome::Failed {
            retryable: is_retryable_kube_error(error),
            message: error.to_string(),
        }
    }

    fn cancelled() -> Self {
        NodeOutcome::Pending {
            reason: "reconcile cancelled".to_string(),
        }
    }
}

/// Outcome of one node, in realization order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub kind: NodeKind,
    pub name: String,
    pub outcome: NodeOutcome,
    /// Whether the pass issued a write for this node
    pub written: bool,
}

impl NodeReport {
    /// `Kind name`, as used in condition messages
    pub fn object(&self) -> String {
        format!("{} {}", self.kind, self.name)
    }
}

fn describe_node(node: &Node) -> String {
    format!("{} {}", node.kind(), node.name())
}

/// Converges one graph for one custom resource
#[derive(Debug)]
pub struct Realizer<'a> {
    pub cluster: &'a dyn ClusterClient,
    pub cancel: &'a CancellationToken,
    pub namespace: &'a str,
    /// Controller reference to the custom resource
    pub owner: &'a OwnerReference,
    /// Standard labels merged into every managed object
    pub labels: &'a BTreeMap<String, String>,
}

impl Realizer<'_> {
    /// Realize every node of `graph`, in topological order
    pub async fn realize(&self, graph: &ResourceGraph) -> Vec<NodeReport> {
        let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; graph.len()];
        let mut observed_secrets: HashMap<NodeId, Secret> = HashMap::new();
        let mut reports = Vec::with_capacity(graph.len());

        for id in graph.topological_order() {
            let node = graph.node(id);
            let waiting_on: Vec<String> = node
                .dependencies()
                .iter()
                .filter(|dep| {
                    !outcomes[dep.index()]
                        .as_ref()
                        .is_some_and(NodeOutcome::is_ready)
                })
                .map(|dep| describe_node(graph.node(*dep)))
                .collect();

            let (outcome, written) = if !waiting_on.is_empty() {
                (NodeOutcome::Blocked { waiting_on }, false)
            } else if self.cancel.is_cancelled() {
                (NodeOutcome::cancelled(), false)
            } else {
                match node.object() {
                    NodeObject::ExternalSecret(reference) => {
                        let (outcome, observed) = self.observe_external(reference).await;
                        if let Some(secret) = observed {
                            observed_secrets.insert(id, secret);
                        }
                        (outcome, false)
                    }
                    object => {
                        let desired = self.desired(graph, id, object, &observed_secrets);
                        self.converge(&desired).await
                    }
                }
            };

            log_outcome(node, &outcome, written);
            outcomes[id.index()] = Some(outcome.clone());
            reports.push(NodeReport {
                kind: node.kind(),
                name: node.name().to_string(),
                outcome,
                written,
            });
        }

        reports
    }

    /// Outcome of a user-owned secret, plus the secret when it is ready
    async fn observe_external(
        &self,
        reference: &ExternalSecretRef,
    ) -> (NodeOutcome, Option<Secret>) {
        let secret = match self.cluster.get_secret(self.namespace, &reference.name).await {
            Ok(secret) => secret,
            Err(e) => return (NodeOutcome::from_kube_error(&e), None),
        };
        match readiness::external_secret_readiness(reference, secret.as_ref()) {
            Ok(Readiness::Ready) => (NodeOutcome::Ready, secret),
            Ok(Readiness::NotReady(reason)) => (NodeOutcome::Pending { reason }, None),
            Err(message) => (
                NodeOutcome::Failed {
                    retryable: false,
                    message,
                },
                None,
            ),
        }
    }

    /// Planned object plus owner reference, labels and dependency checksum
    fn desired(
        &self,
        graph: &ResourceGraph,
        id: NodeId,
        object: &NodeObject,
        observed_secrets: &HashMap<NodeId, Secret>,
    ) -> NodeObject {
        let mut desired = object.clone();
        if let Some(meta) = desired.metadata_mut() {
            meta.namespace = Some(self.namespace.to_string());
            meta.owner_references = Some(vec![self.owner.clone()]);
            meta.labels
                .get_or_insert_with(BTreeMap::new)
                .extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let NodeObject::Deployment(deployment) = &mut desired {
            if let Some(spec) = deployment.spec.as_mut() {
                let checksum = dependencies_checksum(graph, id, observed_secrets);
                spec.template
                    .metadata
                    .get_or_insert_with(ObjectMeta::default)
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(DEPENDENCIES_CHECKSUM_ANNOTATION.to_string(), checksum);
            }
        }
        desired
    }

    /// Create or patch `desired` unless the cluster already holds it
    async fn converge(&self, desired: &NodeObject) -> (NodeOutcome, bool) {
        let current = match self
            .cluster
            .get(self.namespace, desired.kind(), desired.name())
            .await
        {
            Ok(current) => current,
            Err(e) => return (NodeOutcome::from_kube_error(&e), false),
        };

        if let Some(current) = current.filter(|current| is_up_to_date(desired, current)) {
            return (
                NodeOutcome::from_readiness(readiness::evaluate(&current)),
                false,
            );
        }

        // In-flight writes may finish; no new ones start after cancellation
        if self.cancel.is_cancelled() {
            return (NodeOutcome::cancelled(), false);
        }

        match self.cluster.apply(self.namespace, desired).await {
            Ok(stored) => (
                NodeOutcome::from_readiness(readiness::evaluate(&stored)),
                true,
            ),
            Err(e) => (NodeOutcome::from_kube_error(&e), false),
        }
    }
}

fn log_outcome(node: &Node, outcome: &NodeOutcome, written: bool) {
    let kind = node.kind().as_str();
    let name = node.name();
    match outcome {
        NodeOutcome::Ready | NodeOutcome::Applied { .. } if written => {
            info!(node.kind = kind, node.name = name, outcome = outcome.label(), "applied");
        }
        NodeOutcome::Ready => debug!(node.kind = kind, node.name = name, "ready"),
        NodeOutcome::Applied { detail } => {
            debug!(node.kind = kind, node.name = name, detail = %detail, "not ready");
        }
        NodeOutcome::Pending { reason } => {
            debug!(node.kind = kind, node.name = name, reason = %reason, "pending");
        }
        NodeOutcome::Blocked { waiting_on } => {
            debug!(node.kind = kind, node.name = name, waiting_on = ?waiting_on, "blocked");
        }
        NodeOutcome::Failed {
            retryable: true,
            message,
        } => warn!(node.kind = kind, node.name = name, error = %message, "realization failed"),
        NodeOutcome::Failed {
            retryable: false,
            message,
        } => error!(node.kind = kind, node.name = name, error = %message, "realization failed"),
    }
}

/// Whether `current` already carries every field of `desired`
///
/// Fields the cluster adds (defaults, status, server metadata) are ignored;
/// empty planned maps and lists match absent ones. Resource quantities are
/// compared by value, since the API server rewrites `0.5` as `500m`.
pub fn is_up_to_date(desired: &NodeObject, current: &NodeObject) -> bool {
    match (to_json(desired), to_json(current)) {
        (Some(desired), Some(current)) => is_subset(&desired, &current, false),
        _ => false,
    }
}

fn to_json(object: &NodeObject) -> Option<Value> {
    match object {
        NodeObject::Service(o) => serde_json::to_value(o).ok(),
        NodeObject::ConfigMap(o) => serde_json::to_value(o).ok(),
        NodeObject::Secret(o) => serde_json::to_value(o).ok(),
        NodeObject::Deployment(o) => serde_json::to_value(o).ok(),
        NodeObject::NetworkPolicy(o) => serde_json::to_value(o).ok(),
        NodeObject::ExternalSecret(_) => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Fields holding a quantity, or a map of quantities
const QUANTITY_FIELDS: &[&str] = &["limits", "requests", "sizeLimit"];

fn is_subset(desired: &Value, current: &Value, quantities: bool) -> bool {
    match (desired, current) {
        (Value::Null, _) => true,
        (Value::Object(desired), Value::Object(current)) => desired.iter().all(|(key, value)| {
            let quantities = quantities || QUANTITY_FIELDS.contains(&key.as_str());
            current.get(key).map_or_else(
                || is_empty(value),
                |observed| is_subset(value, observed, quantities),
            )
        }),
        (Value::Array(desired), Value::Array(current)) => {
            desired.len() == current.len()
                && desired
                    .iter()
                    .zip(current)
                    .all(|(value, observed)| is_subset(value, observed, quantities))
        }
        (Value::String(desired), Value::String(current)) if quantities => {
            desired == current
                || matches!(
                    (quantity_value(desired), quantity_value(current)),
                    (Some(a), Some(b)) if (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()) * 4.0
                )
        }
        _ => desired == current,
    }
}

/// Numeric value of a Kubernetes quantity (`500m`, `1.5Gi`, `2e3`)
fn quantity_value(quantity: &str) -> Option<f64> {
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
        ("n", 1e-9),
        ("u", 1e-6),
        ("m", 1e-3),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    let quantity = quantity.trim();
    if let Some((number, multiplier)) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| quantity.strip_suffix(suffix).map(|n| (n, *multiplier)))
    {
        // "1E" is exa, but "1e3" is an exponent and parses below
        if let Ok(value) = number.parse::<f64>() {
            return Some(value * multiplier);
        }
    }
    quantity.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// SHA-256 over the data of every ConfigMap and Secret `id` depends on
///
/// Managed dependencies contribute their planned data; external secrets
/// contribute what was observed in this pass.
pub fn dependencies_checksum(
    graph: &ResourceGraph,
    id: NodeId,
    observed_secrets: &HashMap<NodeId, Secret>,
) -> String {
    let mut hasher = Sha256::new();
    for dep in graph.transitive_dependencies(id) {
        let node = graph.node(dep);
        match node.object() {
            NodeObject::ConfigMap(config_map) => {
                hash_entry(&mut hasher, node.kind().as_str(), node.name().as_bytes());
                for (key, value) in config_map.data.iter().flatten() {
                    hash_entry(&mut hasher, key, value.as_bytes());
                }
                for (key, value) in config_map.binary_data.iter().flatten() {
                    hash_entry(&mut hasher, key, &value.0);
                }
            }
            NodeObject::Secret(secret) => {
                hash_entry(&mut hasher, node.kind().as_str(), node.name().as_bytes());
                hash_secret(&mut hasher, secret);
            }
            NodeObject::ExternalSecret(_) => {
                if let Some(secret) = observed_secrets.get(&dep) {
                    hash_entry(&mut hasher, node.kind().as_str(), node.name().as_bytes());
                    hash_secret(&mut hasher, secret);
                }
            }
            NodeObject::Service(_) | NodeObject::Deployment(_) | NodeObject::NetworkPolicy(_) => {}
        }
    }
    format!("{:x}", hasher.finalize())
}

fn hash_secret(hasher: &mut Sha256, secret: &Secret) {
    for (key, value) in secret.data.iter().flatten() {
        hash_entry(hasher, key, &value.0);
    }
    for (key, value) in secret.string_data.iter().flatten() {
        hash_entry(hasher, key, value.as_bytes());
    }
}

fn hash_entry(hasher: &mut Sha256, key: &str, value: &[u8]) {
    hasher.update(key.as_bytes());
    hasher.update([0]);
    hasher.update(value);
    hasher.update([0]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};

    fn config_map(name: &str, content: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                "config.yaml".to_string(),
                content.to_string(),
            )])),
            ..ConfigMap::default()
        }
    }

    fn graph_with(content: &str) -> (ResourceGraph, NodeId) {
        let mut graph = ResourceGraph::new();
        let cm = graph.add_config_map(config_map("cm1", content), &[]).unwrap();
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("cm1".to_string()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        };
        let id = graph.add_deployment(deployment, &[cm]).unwrap();
        (graph, id)
    }

    #[test]
    fn test_checksum_tracks_dependency_content() {
        let (graph, id) = graph_with("port: 8080");
        let first = dependencies_checksum(&graph, id, &HashMap::new());
        let (same, same_id) = graph_with("port: 8080");
        assert_eq!(first, dependencies_checksum(&same, same_id, &HashMap::new()));

        let (changed, changed_id) = graph_with("port: 8443");
        assert_ne!(first, dependencies_checksum(&changed, changed_id, &HashMap::new()));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_server_defaults_do_not_count_as_drift() {
        let desired = NodeObject::Service(Service {
            metadata: ObjectMeta {
                name: Some("cm1".to_string()),
                annotations: Some(BTreeMap::new()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 80,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        });

        let mut current = desired.clone();
        if let NodeObject::Service(service) = &mut current {
            service.metadata.annotations = None;
            service.metadata.resource_version = Some("42".to_string());
            let spec = service.spec.as_mut().unwrap();
            spec.cluster_ip = Some("10.0.0.12".to_string());
            spec.ports.as_mut().unwrap()[0].protocol = Some("TCP".to_string());
        }
        assert!(is_up_to_date(&desired, &current));

        if let NodeObject::Service(service) = &mut current {
            service.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 443;
        }
        assert!(!is_up_to_date(&desired, &current));
    }

    #[test]
    fn test_normalized_quantities_are_not_drift() {
        use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, ResourceRequirements};
        use k8s_openapi::api::apps::v1::DeploymentSpec;
        use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

        let with_resources = |cpu: &str, memory: &str| {
            NodeObject::Deployment(Deployment {
                metadata: ObjectMeta {
                    name: Some("core".to_string()),
                    ..ObjectMeta::default()
                },
                spec: Some(DeploymentSpec {
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: "core".to_string(),
                                resources: Some(ResourceRequirements {
                                    requests: Some(BTreeMap::from([
                                        ("cpu".to_string(), Quantity(cpu.to_string())),
                                        ("memory".to_string(), Quantity(memory.to_string())),
                                    ])),
                                    ..ResourceRequirements::default()
                                }),
                                ..Container::default()
                            }],
                            ..PodSpec::default()
                        }),
                        ..PodTemplateSpec::default()
                    },
                    ..DeploymentSpec::default()
                }),
                ..Deployment::default()
            })
        };

        assert!(is_up_to_date(
            &with_resources("0.5", "1Gi"),
            &with_resources("500m", "1024Mi")
        ));
        assert!(!is_up_to_date(
            &with_resources("0.5", "1Gi"),
            &with_resources("250m", "1Gi")
        ));
    }

    #[test]
    fn test_quantity_values() {
        assert_eq!(quantity_value("500m"), Some(0.5));
        assert_eq!(quantity_value("2Ki"), Some(2048.0));
        assert_eq!(quantity_value("1e3"), Some(1000.0));
        assert_eq!(quantity_value("1k"), Some(1000.0));
        assert_eq!(quantity_value("lots"), None);
    }

    #[test]
    fn test_external_secrets_are_never_up_to_date() {
        let reference = NodeObject::ExternalSecret(ExternalSecretRef {
            name: "pw".to_string(),
            expected_type: None,
        });
        assert!(!is_up_to_date(&reference, &reference));
    }

    #[test]
    fn test_outcome_descriptions() {
        let blocked = NodeOutcome::Blocked {
            waiting_on: vec!["ConfigMap cm1".to_string(), "Secret cm1".to_string()],
        };
        assert_eq!(blocked.describe(), "waiting for ConfigMap cm1, Secret cm1");
        assert_eq!(blocked.label(), "blocked");
        assert!(NodeOutcome::Failed {
            retryable: false,
            message: "bad".to_string()
        }
        .is_permanent_failure());
        assert!(!NodeOutcome::Failed {
            retryable: true,
            message: "conflict".to_string()
        }
        .is_permanent_failure());
    }
}
