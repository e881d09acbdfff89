//! ChartMuseum: Helm chart repository.

use super::resources::{
    self, env, env_from_secret, env_from_secret_key, http_probe, mount, mount_file,
    public_port, DeploymentPlan, HTTPS_PORT_NAME, HTTP_PORT_NAME,
};
use super::secrets::{secret_key, secret_type};
use super::{PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::ComponentResource;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use minijinja::Value;
use serde_json::json;

pub const CONTAINER_NAME: &str = "chartmuseum";
pub const CONFIG_KEY: &str = "config.yaml";
pub const HTTP_PORT: i32 = 8080;
pub const HTTPS_PORT: i32 = 8443;
pub const HEALTH_PATH: &str = "/health";

const CONFIG_PATH: &str = "/etc/chartmuseum";
const STORAGE_DIRECTORY: &str = "/mnt/chartstorage";
const CERTIFICATE_DIRECTORY: &str = "/etc/chartmuseum/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct ChartMuseumPlanner;

#[async_trait]
impl Planner for ChartMuseumPlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::ChartMuseum
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::ChartMuseum(chartmuseum) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &chartmuseum.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, HTTP_PORT)
        };

        let content = ctx.render(
            self.uid(),
            spec,
            json!({ "port": port, "tls": tls }),
            vec![
                ("storage_directory", Value::from_function(|| STORAGE_DIRECTORY)),
                (
                    "certificate_directory",
                    Value::from_function(|| CERTIFICATE_DIRECTORY),
                ),
            ],
        )?;
        let config = graph.add_config_map(resources::config_map(ctx, CONFIG_KEY, content), &[])?;
        let mut deps = vec![config];

        let name = ctx.object_name();
        let mut deployment = DeploymentPlan::new(CONTAINER_NAME, ctx.image(self.uid(), &spec.component)?)
            .args(vec![
                "--config".to_string(),
                format!("{CONFIG_PATH}/{CONFIG_KEY}"),
            ])
            .port(port_name, port)
            .probe(http_probe(HEALTH_PATH, port, tls, None))
            .volume(
                resources::config_map_volume("config", &name),
                [mount_file("config", &format!("{CONFIG_PATH}/{CONFIG_KEY}"), CONFIG_KEY)],
            );

        if let Some(basic_auth) = spec
            .authentication
            .as_ref()
            .and_then(|auth| auth.basic_auth_ref.as_deref())
        {
            deps.push(graph.ensure_external_secret(basic_auth, Some(secret_type::BASIC_AUTH))?);
            deployment = deployment
                .env(env_from_secret_key("BASIC_AUTH_USER", basic_auth, secret_key::USERNAME))
                .env(env_from_secret_key("BASIC_AUTH_PASS", basic_auth, secret_key::PASSWORD));
        }

        if let Some(object_store) = &spec.storage.object_store {
            deps.push(graph.ensure_external_secret(&object_store.secret_ref, None)?);
            deployment = deployment
                .env(env("STORAGE", object_store.kind.clone()))
                .env_from(env_from_secret(&object_store.secret_ref, None));
        } else {
            let volume = spec
                .storage
                .file_system
                .as_ref()
                .map(|fs| fs.volume.clone())
                .unwrap_or_default();
            deployment = deployment
                .env(env("STORAGE", "local"))
                .env(env("STORAGE_LOCAL_ROOTDIR", STORAGE_DIRECTORY))
                .volume(
                    resources::volume_from_source("storage", &volume),
                    [mount("storage", STORAGE_DIRECTORY, false)],
                );
        }

        if let Some(redis) = spec.cache.as_ref().and_then(|cache| cache.redis.as_ref()) {
            deployment = deployment
                .env(env("CACHE", "redis"))
                .env(env("CACHE_REDIS_ADDR", redis.address()))
                .env(env("CACHE_REDIS_DB", redis.database().to_string()));
            if let Some(password) = &redis.password_ref {
                deps.push(graph.ensure_external_secret(password, Some(secret_type::REDIS))?);
                deployment = deployment.env(env_from_secret_key(
                    "CACHE_REDIS_PASSWORD",
                    password,
                    secret_key::REDIS_PASSWORD,
                ));
            }
        }

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
