//! # Cluster Client
//!
//! The narrow slice of the Kubernetes API the engine and planners use.
//!
//! Managed objects are written with server-side apply under the operator's
//! field manager, so fields set by users or other controllers outside the
//! operator's stewardship are preserved. The engine never retries individual
//! calls; errors are returned to the reconcile pass, which requeues the key.

use crate::constants::FIELD_MANAGER;
use crate::crd::ComponentStatus;
use crate::graph::{NodeKind, NodeObject};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Cluster operations used by one reconcile pass
#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    /// Fetch a component custom resource
    async fn get_component(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error>;

    /// Replace the status subresource of a component custom resource
    async fn patch_component_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), kube::Error>;

    /// Current state of a planned object, `None` when absent
    async fn get(
        &self,
        namespace: &str,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<NodeObject>, kube::Error>;

    /// Create or patch a managed object, returning the stored state
    async fn apply(&self, namespace: &str, object: &NodeObject) -> Result<NodeObject, kube::Error>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;
}

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error>
    where
        K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + fmt::Debug,
    {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn apply_typed<K>(&self, namespace: &str, object: &K) -> Result<K, kube::Error>
    where
        K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + fmt::Debug,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        Api::<K>::namespaced(self.client.clone(), namespace)
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(object),
            )
            .await
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_component(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        Api::<DynamicObject>::namespaced_with(self.client.clone(), namespace, resource)
            .get_opt(name)
            .await
    }

    async fn patch_component_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "status": status });
        Api::<DynamicObject>::namespaced_with(self.client.clone(), namespace, resource)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        namespace: &str,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<NodeObject>, kube::Error> {
        Ok(match kind {
            NodeKind::Service => self
                .get_typed::<Service>(namespace, name)
                .await?
                .map(NodeObject::Service),
            NodeKind::ConfigMap => self
                .get_typed::<ConfigMap>(namespace, name)
                .await?
                .map(NodeObject::ConfigMap),
            NodeKind::Secret | NodeKind::ExternalSecret => self
                .get_typed::<Secret>(namespace, name)
                .await?
                .map(NodeObject::Secret),
            NodeKind::Deployment => self
                .get_typed::<Deployment>(namespace, name)
                .await?
                .map(NodeObject::Deployment),
            NodeKind::NetworkPolicy => self
                .get_typed::<NetworkPolicy>(namespace, name)
                .await?
                .map(NodeObject::NetworkPolicy),
        })
    }

    async fn apply(&self, namespace: &str, object: &NodeObject) -> Result<NodeObject, kube::Error> {
        Ok(match object {
            NodeObject::Service(o) => NodeObject::Service(self.apply_typed(namespace, o).await?),
            NodeObject::ConfigMap(o) => {
                NodeObject::ConfigMap(self.apply_typed(namespace, o).await?)
            }
            NodeObject::Secret(o) => NodeObject::Secret(self.apply_typed(namespace, o).await?),
            NodeObject::Deployment(o) => {
                NodeObject::Deployment(self.apply_typed(namespace, o).await?)
            }
            NodeObject::NetworkPolicy(o) => {
                NodeObject::NetworkPolicy(self.apply_typed(namespace, o).await?)
            }
            // Never written
            NodeObject::ExternalSecret(_) => object.clone(),
        })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        self.get_typed::<Secret>(namespace, name).await
    }
}

/// Whether a Kubernetes API error may resolve on its own
///
/// Conflicts, throttling, server errors, not-found and transport failures
/// are transient; rejected objects (400, 403, 422 and other 4xx) are not.
pub fn is_retryable_kube_error(error: &kube::Error) -> bool {
    match error {
        kube::Error::Api(response) => match response.code {
            404 | 408 | 409 | 429 => true,
            code if code >= 500 => true,
            _ => false,
        },
        kube::Error::SerdeError(_) => false,
        _ => true,
    }
}
