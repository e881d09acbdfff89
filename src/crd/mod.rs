//! # Custom Resource Definitions
//!
//! CRD types for the Harbor components reconciled by this operator.
//!
//! Every kind lives in group `goharbor.io`, version `v1beta1`, is namespaced,
//! and shares the [`ComponentStatus`] status subresource. The operator never
//! writes a spec; it only patches status.

mod chartmuseum;
mod common;
mod core_spec;
mod jobservice;
mod notary;
mod portal;
mod registry;
mod status;
mod trivy;

pub use core_spec::*;
pub use chartmuseum::*;
pub use common::*;
pub use jobservice::*;
pub use notary::*;
pub use portal::*;
pub use registry::*;
pub use status::*;
pub use trivy::*;

use crate::controller::ControllerUid;
use kube::core::NamespaceResourceScope;
use kube::{CustomResourceExt, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

/// A component custom resource, erased to a tagged variant
///
/// Planners accept this type and match the variant they handle once; any
/// other variant is a dispatch bug reported as a non-retryable error.
#[derive(Debug, Clone)]
pub enum ComponentResource {
    ChartMuseum(Arc<ChartMuseum>),
    Core(Arc<Core>),
    JobService(Arc<JobService>),
    NotaryServer(Arc<NotaryServer>),
    NotarySigner(Arc<NotarySigner>),
    Portal(Arc<Portal>),
    Registry(Arc<Registry>),
    RegistryController(Arc<RegistryController>),
    Trivy(Arc<Trivy>),
}

impl ComponentResource {
    /// Controller owning this kind of resource
    pub fn uid(&self) -> ControllerUid {
        match self {
            ComponentResource::ChartMuseum(_) => ControllerUid::ChartMuseum,
            ComponentResource::Core(_) => ControllerUid::Core,
            ComponentResource::JobService(_) => ControllerUid::JobService,
            ComponentResource::NotaryServer(_) => ControllerUid::NotaryServer,
            ComponentResource::NotarySigner(_) => ControllerUid::NotarySigner,
            ComponentResource::Portal(_) => ControllerUid::Portal,
            ComponentResource::Registry(_) => ControllerUid::Registry,
            ComponentResource::RegistryController(_) => ControllerUid::RegistryController,
            ComponentResource::Trivy(_) => ControllerUid::Trivy,
        }
    }
}

/// Behaviour shared by every component kind, used by the generic engine
pub trait HarborComponent:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + CustomResourceExt
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Controller handling this kind
    const UID: ControllerUid;

    fn component_status(&self) -> Option<&ComponentStatus>;

    fn component_spec(&self) -> &ComponentSpec;

    fn into_resource(self: Arc<Self>) -> ComponentResource;
}

macro_rules! harbor_component {
    ($kind:ident, $uid:ident) => {
        impl HarborComponent for $kind {
            const UID: ControllerUid = ControllerUid::$uid;

            fn component_status(&self) -> Option<&ComponentStatus> {
                self.status.as_ref()
            }

            fn component_spec(&self) -> &ComponentSpec {
                &self.spec.component
            }

            fn into_resource(self: Arc<Self>) -> ComponentResource {
                ComponentResource::$uid(self)
            }
        }
    };
}

harbor_component!(ChartMuseum, ChartMuseum);
harbor_component!(Core, Core);
harbor_component!(JobService, JobService);
harbor_component!(NotaryServer, NotaryServer);
harbor_component!(NotarySigner, NotarySigner);
harbor_component!(Portal, Portal);
harbor_component!(Registry, Registry);
harbor_component!(RegistryController, RegistryController);
harbor_component!(Trivy, Trivy);

/// Every CRD served by the operator, in generation order
pub fn all_crds() -> Vec<k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition>
{
    vec![
        ChartMuseum::crd(),
        Core::crd(),
        JobService::crd(),
        NotaryServer::crd(),
        NotarySigner::crd(),
        Portal::crd(),
        Registry::crd(),
        RegistryController::crd(),
        Trivy::crd(),
    ]
}
