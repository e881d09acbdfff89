//! # Resource Graph
//!
//! Append-only DAG of the cluster objects planned for one reconcile pass.
//!
//! A node may only depend on nodes added before it, so every edge points
//! backwards in insertion order and the graph cannot contain a cycle. The
//! builder rejects forward or unknown references instead of detecting cycles
//! later. Iteration follows a topological order with deterministic
//! tie-breaking by kind, then by name, so logs and events are stable.

mod node;

pub use node::{ExternalSecretRef, Node, NodeId, NodeKind, NodeObject};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use thiserror::Error;

/// Planner bugs detected while building a graph. Never retryable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("{kind} node '{name}' depends on unknown node #{dependency}; dependencies must be added first")]
    UnknownDependency {
        kind: NodeKind,
        name: String,
        dependency: usize,
    },

    #[error("{kind} node '{name}' is planned twice")]
    DuplicateNode { kind: NodeKind, name: String },

    #[error("{kind} node has no name")]
    MissingName { kind: NodeKind },

    #[error("secret '{name}' is required with type {first} and with type {second}")]
    ConflictingSecretType {
        name: String,
        first: String,
        second: String,
    },
}

/// Planned objects and their dependency edges for one reconcile pass
#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<Node>,
    names: HashSet<(NodeKind, String)>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(&mut self, service: Service) -> Result<NodeId, GraphError> {
        self.add(NodeObject::Service(service), &[])
    }

    pub fn add_config_map(
        &mut self,
        config_map: ConfigMap,
        dependencies: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.add(NodeObject::ConfigMap(config_map), dependencies)
    }

    pub fn add_secret(
        &mut self,
        secret: Secret,
        dependencies: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.add(NodeObject::Secret(secret), dependencies)
    }

    /// Observe a user-owned secret; the engine never writes it
    pub fn add_external_secret(
        &mut self,
        name: impl Into<String>,
        expected_type: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        self.add(
            NodeObject::ExternalSecret(ExternalSecretRef {
                name: name.into(),
                expected_type: expected_type.map(str::to_string),
            }),
            &[],
        )
    }

    /// Like [`Self::add_external_secret`], but returns the existing node when
    /// the same secret is referenced twice (for example one password secret
    /// shared by two Redis connections).
    ///
    /// An untyped reference takes the type of a typed one; two different
    /// types for the same secret are an error.
    pub fn ensure_external_secret(
        &mut self,
        name: &str,
        expected_type: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let Some(existing) = self.find(NodeKind::ExternalSecret, name) else {
            return self.add_external_secret(name, expected_type);
        };
        if let NodeObject::ExternalSecret(external) = self.nodes[existing.index()].object_mut() {
            let current = external.expected_type.clone();
            match (current.as_deref(), expected_type) {
                (Some(first), Some(second)) if first != second => {
                    return Err(GraphError::ConflictingSecretType {
                        name: name.to_string(),
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
                (None, Some(second)) => external.expected_type = Some(second.to_string()),
                _ => {}
            }
        }
        Ok(existing)
    }

    pub fn add_deployment(
        &mut self,
        deployment: Deployment,
        dependencies: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.add(NodeObject::Deployment(deployment), dependencies)
    }

    pub fn add_network_policy(
        &mut self,
        policy: NetworkPolicy,
        dependencies: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.add(NodeObject::NetworkPolicy(policy), dependencies)
    }

    fn add(&mut self, object: NodeObject, dependencies: &[NodeId]) -> Result<NodeId, GraphError> {
        let kind = object.kind();
        let name = object.name().to_string();
        if name.is_empty() {
            return Err(GraphError::MissingName { kind });
        }

        // Only back-edges: a dependency must already exist
        if let Some(unknown) = dependencies.iter().find(|dep| dep.index() >= self.nodes.len()) {
            return Err(GraphError::UnknownDependency {
                kind,
                name,
                dependency: unknown.index(),
            });
        }

        if !self.names.insert((kind, name.clone())) {
            return Err(GraphError::DuplicateNode { kind, name });
        }

        let mut deps = dependencies.to_vec();
        deps.sort_unstable();
        deps.dedup();

        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(id, object, deps));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Node of the given kind and name, if planned
    pub fn find(&self, kind: NodeKind, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|node| node.kind() == kind && node.name() == name)
            .map(Node::id)
    }

    /// Direct dependents of `id`
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.dependencies().contains(&id))
            .map(Node::id)
            .collect()
    }

    /// Every node `id` depends on, directly or transitively
    pub fn transitive_dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = self.node(id).dependencies().to_vec();
        while let Some(dep) = stack.pop() {
            if seen.insert(dep) {
                stack.extend_from_slice(self.node(dep).dependencies());
            }
        }
        let mut deps: Vec<NodeId> = seen.into_iter().collect();
        deps.sort_unstable();
        deps
    }

    /// Topological order; ready nodes are released by kind, then by name
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.dependencies().len())
            .collect();
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for node in &self.nodes {
            for dep in node.dependencies() {
                dependents[dep.index()].push(node.id());
            }
        }

        let mut ready: BinaryHeap<Reverse<(NodeKind, String, NodeId)>> = self
            .nodes
            .iter()
            .filter(|node| node.dependencies().is_empty())
            .map(|node| Reverse((node.kind(), node.name().to_string(), node.id())))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, id))) = ready.pop() {
            order.push(id);
            for dependent in &dependents[id.index()] {
                let count = &mut remaining[dependent.index()];
                *count -= 1;
                if *count == 0 {
                    let node = self.node(*dependent);
                    ready.push(Reverse((node.kind(), node.name().to_string(), node.id())));
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        }
    }

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: meta(name),
            ..ConfigMap::default()
        }
    }

    fn deployment(name: &str) -> Deployment {
        Deployment {
            metadata: meta(name),
            ..Deployment::default()
        }
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut graph = ResourceGraph::new();
        let err = graph
            .add_deployment(deployment("core"), &[NodeId::new(3)])
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { dependency: 3, .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add_config_map(config_map("core"), &[]).unwrap();
        let err = graph.add_config_map(config_map("core"), &[]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateNode {
                kind: NodeKind::ConfigMap,
                name: "core".to_string()
            }
        );
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let mut graph = ResourceGraph::new();
        let cm = graph.add_config_map(config_map("core"), &[]).unwrap();
        graph.add_deployment(deployment("core"), &[cm]).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut graph = ResourceGraph::new();
        let err = graph.add_config_map(ConfigMap::default(), &[]).unwrap_err();
        assert_eq!(err, GraphError::MissingName { kind: NodeKind::ConfigMap });
    }

    #[test]
    fn test_topological_order_respects_edges_and_ties() {
        let mut graph = ResourceGraph::new();
        let password = graph.add_external_secret("redis-pw", Some("goharbor.io/redis")).unwrap();
        let derived = graph
            .add_secret(
                Secret {
                    metadata: meta("core"),
                    ..Secret::default()
                },
                &[password],
            )
            .unwrap();
        let cm_b = graph.add_config_map(config_map("b"), &[]).unwrap();
        let cm_a = graph.add_config_map(config_map("a"), &[]).unwrap();
        let deploy = graph.add_deployment(deployment("core"), &[cm_b, derived]).unwrap();
        let service = graph
            .add_service(Service {
                metadata: meta("core"),
                ..Service::default()
            })
            .unwrap();

        let order = graph.topological_order();
        assert_eq!(order, vec![password, derived, cm_a, cm_b, service, deploy]);
    }

    #[test]
    fn test_order_is_stable_across_runs() {
        let build = || {
            let mut graph = ResourceGraph::new();
            let s = graph.add_external_secret("x", None).unwrap();
            let c = graph.add_config_map(config_map("c"), &[s]).unwrap();
            graph.add_deployment(deployment("d"), &[c, s]).unwrap();
            graph.add_service(Service { metadata: meta("d"), ..Service::default() }).unwrap();
            graph
                .topological_order()
                .into_iter()
                .map(|id| {
                    let node = graph.node(id);
                    format!("{}/{}", node.kind(), node.name())
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_ensure_external_secret_deduplicates() {
        let mut graph = ResourceGraph::new();
        let first = graph.ensure_external_secret("pw", Some("goharbor.io/redis")).unwrap();
        let second = graph.ensure_external_secret("pw", Some("goharbor.io/redis")).unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_ensure_external_secret_rejects_conflicting_types() {
        let mut graph = ResourceGraph::new();
        let id = graph.ensure_external_secret("shared", None).unwrap();
        assert_eq!(graph.ensure_external_secret("shared", Some("goharbor.io/redis")).unwrap(), id);
        let NodeObject::ExternalSecret(external) = graph.node(id).object() else {
            panic!("expected an external secret");
        };
        assert_eq!(external.expected_type.as_deref(), Some("goharbor.io/redis"));

        let err = graph
            .ensure_external_secret("shared", Some("kubernetes.io/basic-auth"))
            .unwrap_err();
        assert!(matches!(err, GraphError::ConflictingSecretType { ref name, .. } if name == "shared"));
        // An untyped reference keeps the stricter type
        assert_eq!(graph.ensure_external_secret("shared", None).unwrap(), id);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_transitive_dependencies() {
        let mut graph = ResourceGraph::new();
        let pw = graph.add_external_secret("pw", None).unwrap();
        let secret = graph
            .add_secret(Secret { metadata: meta("derived"), ..Secret::default() }, &[pw])
            .unwrap();
        let deploy = graph.add_deployment(deployment("d"), &[secret]).unwrap();
        assert_eq!(graph.transitive_dependencies(deploy), vec![pw, secret]);
        assert_eq!(graph.dependents(pw), vec![secret]);
    }
}
