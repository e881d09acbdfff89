//! Graph nodes and the typed objects they carry.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

/// Index of a node in its [`super::ResourceGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of a planned object
///
/// The declaration order is the tie-break order used when several nodes are
/// ready at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    ExternalSecret,
    Secret,
    ConfigMap,
    Service,
    Deployment,
    NetworkPolicy,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::ExternalSecret => "ExternalSecret",
            NodeKind::Secret => "Secret",
            NodeKind::ConfigMap => "ConfigMap",
            NodeKind::Service => "Service",
            NodeKind::Deployment => "Deployment",
            NodeKind::NetworkPolicy => "NetworkPolicy",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret owned by the user, observed but never written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSecretRef {
    pub name: String,
    /// Secret `type` the consumer requires, checked during readiness
    pub expected_type: Option<String>,
}

/// Desired state of one object
#[derive(Debug, Clone, PartialEq)]
pub enum NodeObject {
    Service(Service),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Deployment(Deployment),
    NetworkPolicy(NetworkPolicy),
    ExternalSecret(ExternalSecretRef),
}

impl NodeObject {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeObject::Service(_) => NodeKind::Service,
            NodeObject::ConfigMap(_) => NodeKind::ConfigMap,
            NodeObject::Secret(_) => NodeKind::Secret,
            NodeObject::Deployment(_) => NodeKind::Deployment,
            NodeObject::NetworkPolicy(_) => NodeKind::NetworkPolicy,
            NodeObject::ExternalSecret(_) => NodeKind::ExternalSecret,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeObject::ExternalSecret(external) => &external.name,
            other => other
                .metadata()
                .and_then(|meta| meta.name.as_deref())
                .unwrap_or_default(),
        }
    }

    /// Object metadata; `None` for external secrets
    pub fn metadata(&self) -> Option<&ObjectMeta> {
        match self {
            NodeObject::Service(o) => Some(&o.metadata),
            NodeObject::ConfigMap(o) => Some(&o.metadata),
            NodeObject::Secret(o) => Some(&o.metadata),
            NodeObject::Deployment(o) => Some(&o.metadata),
            NodeObject::NetworkPolicy(o) => Some(&o.metadata),
            NodeObject::ExternalSecret(_) => None,
        }
    }

    /// Mutable metadata; `None` for external secrets
    pub fn metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
        match self {
            NodeObject::Service(o) => Some(&mut o.metadata),
            NodeObject::ConfigMap(o) => Some(&mut o.metadata),
            NodeObject::Secret(o) => Some(&mut o.metadata),
            NodeObject::Deployment(o) => Some(&mut o.metadata),
            NodeObject::NetworkPolicy(o) => Some(&mut o.metadata),
            NodeObject::ExternalSecret(_) => None,
        }
    }

    /// Whether the engine writes this object
    pub fn is_managed(&self) -> bool {
        !matches!(self, NodeObject::ExternalSecret(_))
    }
}

/// One node of the graph
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    object: NodeObject,
    dependencies: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, object: NodeObject, dependencies: Vec<NodeId>) -> Self {
        Self {
            id,
            object,
            dependencies,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.object.kind()
    }

    pub fn name(&self) -> &str {
        self.object.name()
    }

    pub fn object(&self) -> &NodeObject {
        &self.object
    }

    pub(crate) fn object_mut(&mut self) -> &mut NodeObject {
        &mut self.object
    }

    /// Direct dependencies, sorted by id
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }
}
