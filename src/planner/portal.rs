//! Portal: the web UI, served by nginx.

use super::resources::{
    self, http_probe, mount, mount_file, public_port, DeploymentPlan, HTTPS_PORT_NAME,
    HTTP_PORT_NAME,
};
use super::secrets::secret_type;
use super::{PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::ComponentResource;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use minijinja::Value;
use serde_json::json;

pub const CONTAINER_NAME: &str = "portal";
pub const CONFIG_KEY: &str = "nginx.conf";
pub const HTTP_PORT: i32 = 8080;
pub const HTTPS_PORT: i32 = 8443;
pub const HEALTH_PATH: &str = "/";

const CONFIG_PATH: &str = "/etc/nginx/nginx.conf";
const CERTIFICATE_DIRECTORY: &str = "/etc/portal/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct PortalPlanner;

#[async_trait]
impl Planner for PortalPlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::Portal
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::Portal(portal) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &portal.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, HTTP_PORT)
        };
        let name = ctx.object_name();

        let content = ctx.render(
            self.uid(),
            spec,
            json!({ "port": port, "tls": tls }),
            vec![(
                "certificate_directory",
                Value::from_function(|| CERTIFICATE_DIRECTORY),
            )],
        )?;
        let config = graph.add_config_map(resources::config_map(ctx, CONFIG_KEY, content), &[])?;
        let mut deps = vec![config];

        let mut deployment = DeploymentPlan::new(CONTAINER_NAME, ctx.image(self.uid(), &spec.component)?)
            .port(port_name, port)
            .probe(http_probe(HEALTH_PATH, port, tls, None))
            .volume(
                resources::config_map_volume("config", &name),
                [mount_file("config", CONFIG_PATH, CONFIG_KEY)],
            );
        if let Some(tls) = &spec.tls {
            deps.push(graph.ensure_external_secret(&tls.certificate_ref, Some(secret_type::TLS))?);
            deployment = deployment.volume(
                resources::secret_volume("certificate", &tls.certificate_ref, &[]),
                [mount("certificate", CERTIFICATE_DIRECTORY, true)],
            );
        }

        graph.add_deployment(deployment.build(ctx, &spec.component), &deps)?;
        graph.add_service(resources::service(ctx, vec![public_port(tls)]))?;
        if ctx.network_policies_enabled(self.uid())? {
            graph.add_network_policy(resources::ingress_policy(ctx, &[port_name]), &[])?;
        }
        Ok(())
    }
}
