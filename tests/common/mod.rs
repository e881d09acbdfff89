//! In-memory cluster shared by the integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use harbor_operator::config::{build_store, FileWatchProvider, InMemoryProvider, SharedConfigStore};
use harbor_operator::controller::cluster::ClusterClient;
use harbor_operator::controller::reconciler::Reconciler;
use harbor_operator::crd::{ComponentStatus, HarborComponent};
use harbor_operator::graph::{NodeKind, NodeObject};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{ApiResource, DynamicObject};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "default";

type Key = (String, String, String);

fn key(kind: &str, namespace: &str, name: &str) -> Key {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn object_kind(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::ExternalSecret | NodeKind::Secret => "Secret",
        other => other.as_str(),
    }
}

#[derive(Debug, Default)]
struct State {
    components: HashMap<Key, DynamicObject>,
    objects: HashMap<Key, NodeObject>,
    writes: Vec<(NodeKind, String)>,
    status_patches: usize,
    auto_ready: bool,
}

/// [`ClusterClient`] holding everything in memory
///
/// Applied Deployments get a generation that increments when their spec
/// changes. With auto-ready on, they also report every replica ready at once.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cluster whose Deployments become ready as soon as they are applied
    pub fn ready() -> Arc<Self> {
        let cluster = Self::new();
        cluster.set_auto_ready(true);
        cluster
    }

    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.state.lock().unwrap().auto_ready = auto_ready;
    }

    /// Store a component, as `kubectl apply` would
    pub fn put_component<K: HarborComponent>(&self, resource: &K) {
        let object: DynamicObject =
            serde_json::from_value(serde_json::to_value(resource).unwrap()).unwrap();
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .components
            .insert(key(&K::kind(&()), &namespace, &name), object);
    }

    /// Current state of a component, including the status written by the engine
    pub fn component<K: HarborComponent>(&self, namespace: &str, name: &str) -> K {
        let state = self.state.lock().unwrap();
        state.components[&key(&K::kind(&()), namespace, name)]
            .clone()
            .try_parse()
            .unwrap()
    }

    pub fn put_secret(&self, name: &str, type_: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            type_: Some(type_.to_string()),
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        };
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key("Secret", NAMESPACE, name), NodeObject::Secret(secret));
    }

    pub fn object(&self, kind: NodeKind, name: &str) -> Option<NodeObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key(object_kind(kind), NAMESPACE, name))
            .cloned()
    }

    pub fn objects(&self) -> Vec<NodeObject> {
        self.state.lock().unwrap().objects.values().cloned().collect()
    }

    /// Every write issued, in order
    pub fn writes(&self) -> Vec<(NodeKind, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn status_patches(&self) -> usize {
        self.state.lock().unwrap().status_patches
    }

    /// Report every replica of every Deployment ready at its current generation
    pub fn mark_deployments_ready(&self) {
        let mut state = self.state.lock().unwrap();
        for object in state.objects.values_mut() {
            if let NodeObject::Deployment(deployment) = object {
                let replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                deployment.status = Some(DeploymentStatus {
                    replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    observed_generation: deployment.metadata.generation,
                    ..DeploymentStatus::default()
                });
            }
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_component(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .components
            .get(&key(&resource.kind, namespace, name))
            .cloned())
    }

    async fn patch_component_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), kube::Error> {
        let mut state = self.state.lock().unwrap();
        state.status_patches += 1;
        if let Some(object) = state.components.get_mut(&key(&resource.kind, namespace, name)) {
            object.data["status"] = serde_json::to_value(status).unwrap();
        }
        Ok(())
    }

    async fn get(
        &self,
        namespace: &str,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<NodeObject>, kube::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&key(object_kind(kind), namespace, name))
            .cloned())
    }

    async fn apply(&self, namespace: &str, object: &NodeObject) -> Result<NodeObject, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let object_key = key(object_kind(object.kind()), namespace, object.name());
        let mut stored = object.clone();

        if let NodeObject::Deployment(deployment) = &mut stored {
            let previous = match state.objects.get(&object_key) {
                Some(NodeObject::Deployment(previous)) => Some(previous.clone()),
                _ => None,
            };
            let generation = match &previous {
                Some(previous) if previous.spec == deployment.spec => {
                    previous.metadata.generation.unwrap_or(1)
                }
                Some(previous) => previous.metadata.generation.unwrap_or(1) + 1,
                None => 1,
            };
            deployment.metadata.generation = Some(generation);
            deployment.status = if state.auto_ready {
                let replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                Some(DeploymentStatus {
                    replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    observed_generation: Some(generation),
                    ..DeploymentStatus::default()
                })
            } else {
                previous.and_then(|previous| previous.status)
            };
        }

        state.writes.push((object.kind(), object.name().to_string()));
        state.objects.insert(object_key, stored.clone());
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Ok(match self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&key("Secret", namespace, name))
        {
            Some(NodeObject::Secret(secret)) => Some(secret.clone()),
            _ => None,
        })
    }
}

/// Operator configuration for tests, isolated from the process environment
pub struct TestConfig {
    pub store: SharedConfigStore,
    pub defaults: Arc<InMemoryProvider>,
    pub files: Arc<FileWatchProvider>,
}

impl TestConfig {
    pub fn new() -> Self {
        let (store, defaults, files) = build_store(Some("HARBOR_OPERATOR_TEST_ISOLATED"));
        Self {
            store,
            defaults,
            files,
        }
    }

    pub fn set(&self, key: &str, value: &str) -> &Self {
        self.defaults.set(key, value);
        self
    }

    pub fn reconciler<K: HarborComponent>(&self, cluster: &Arc<FakeCluster>) -> Reconciler {
        self.reconciler_with_cancel::<K>(cluster, CancellationToken::new())
    }

    pub fn reconciler_with_cancel<K: HarborComponent>(
        &self,
        cluster: &Arc<FakeCluster>,
        cancel: CancellationToken,
    ) -> Reconciler {
        let cluster: Arc<dyn ClusterClient> = Arc::clone(cluster) as Arc<dyn ClusterClient>;
        Reconciler::new(K::UID, cluster, Arc::clone(&self.store), cancel)
            .unwrap()
            .with_controller_version("0.1.0+test")
    }
}

/// Give a new component the metadata the API server would assign
pub fn created<K: HarborComponent>(mut resource: K, uid: &str) -> K {
    let meta = resource.meta_mut();
    meta.namespace = Some(NAMESPACE.to_string());
    meta.uid = Some(uid.to_string());
    meta.generation = Some(1);
    resource
}

pub fn annotated<K: HarborComponent>(mut resource: K, key: &str, value: &str) -> K {
    resource
        .meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    resource
}
