//! # Component Planners
//!
//! One planner per component kind. A planner translates a desired-state
//! custom resource into the [`ResourceGraph`] of cluster objects implementing
//! it: the rendered ConfigMap, derived and referenced Secrets, the Deployment,
//! the Service and, when enabled, an ingress NetworkPolicy.
//!
//! Planners are stateless. Everything they need for one pass arrives through
//! the [`PlanContext`]; all results go into the graph.

mod chartmuseum;
mod context;
mod error;
mod harbor_core;
mod jobservice;
mod notary;
mod portal;
mod registry;
mod resources;
pub mod secrets;
mod trivy;

pub use self::chartmuseum::ChartMuseumPlanner;
pub use self::context::{standard_labels, PlanContext};
pub use self::error::PlanError;
pub use self::harbor_core::CorePlanner;
pub use self::jobservice::JobServicePlanner;
pub use self::notary::{NotaryServerPlanner, NotarySignerPlanner};
pub use self::portal::PortalPlanner;
pub use self::registry::{RegistryControllerPlanner, RegistryPlanner};
pub use self::resources::normalize_name;
pub use self::trivy::TrivyPlanner;

use crate::controller::ControllerUid;
use crate::crd::ComponentResource;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Translates one component kind into a resource graph
#[async_trait]
pub trait Planner: Send + Sync + fmt::Debug {
    /// Component handled by this planner
    fn uid(&self) -> ControllerUid;

    /// Populate `graph` for `resource`
    ///
    /// Secret reads are suspension points; they honour the pass cancellation.
    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError>;
}

/// Planner of `uid`
pub fn planner_for(uid: ControllerUid) -> Arc<dyn Planner> {
    match uid {
        ControllerUid::ChartMuseum => Arc::new(ChartMuseumPlanner),
        ControllerUid::Core => Arc::new(CorePlanner),
        ControllerUid::JobService => Arc::new(JobServicePlanner),
        ControllerUid::NotaryServer => Arc::new(NotaryServerPlanner),
        ControllerUid::NotarySigner => Arc::new(NotarySignerPlanner),
        ControllerUid::Portal => Arc::new(PortalPlanner),
        ControllerUid::Registry => Arc::new(RegistryPlanner),
        ControllerUid::RegistryController => Arc::new(RegistryControllerPlanner),
        ControllerUid::Trivy => Arc::new(TrivyPlanner),
    }
}

/// Built-in image of each component, used when neither the resource nor the
/// `<uid>-docker-image` setting names one
pub fn default_image(uid: ControllerUid) -> &'static str {
    match uid {
        ControllerUid::ChartMuseum => "goharbor/chartmuseum-photon:v2.1.0",
        ControllerUid::Core => "goharbor/harbor-core:v2.1.0",
        ControllerUid::JobService => "goharbor/harbor-jobservice:v2.1.0",
        ControllerUid::NotaryServer => "goharbor/notary-server-photon:v2.1.0",
        ControllerUid::NotarySigner => "goharbor/notary-signer-photon:v2.1.0",
        ControllerUid::Portal => "goharbor/harbor-portal:v2.1.0",
        ControllerUid::Registry => "goharbor/registry-photon:v2.1.0",
        ControllerUid::RegistryController => "goharbor/harbor-registryctl:v2.1.0",
        ControllerUid::Trivy => "goharbor/trivy-adapter-photon:v2.1.0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_uid_has_a_matching_planner() {
        for uid in ControllerUid::ALL {
            assert_eq!(planner_for(uid).uid(), uid);
        }
    }
}
