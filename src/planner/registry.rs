//! Registry (OCI distribution) and its sidecar controller, registryctl.

use super::resources::{
    self, env_from_secret_key, http_probe, mount, mount_file, public_port, DeploymentPlan,
    HTTPS_PORT_NAME, HTTP_PORT_NAME,
};
use super::secrets::{secret_key, secret_type};
use super::{normalize_name, PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::ComponentResource;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use minijinja::Value;
use serde_json::json;

pub const REGISTRY_CONTAINER_NAME: &str = "registry";
pub const REGISTRY_CONFIG_KEY: &str = "config.yml";
pub const REGISTRY_HTTP_PORT: i32 = 5000;
pub const REGISTRY_HTTPS_PORT: i32 = 5443;
pub const REGISTRY_HEALTH_PATH: &str = "/";

pub const CONTROLLER_CONTAINER_NAME: &str = "registryctl";
pub const CONTROLLER_CONFIG_KEY: &str = "config.yml";
pub const CONTROLLER_HTTP_PORT: i32 = 8080;
pub const CONTROLLER_HTTPS_PORT: i32 = 8443;
pub const CONTROLLER_HEALTH_PATH: &str = "/api/health";

const REGISTRY_CONFIG_PATH: &str = "/etc/registry/config.yml";
const REGISTRY_CERTIFICATE_DIRECTORY: &str = "/etc/registry/ssl";
const HTPASSWD_PATH: &str = "/etc/registry/passwd";

const CONTROLLER_CONFIG_PATH: &str = "/etc/registryctl/config.yml";
const CONTROLLER_CERTIFICATE_DIRECTORY: &str = "/etc/registryctl/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryPlanner;

#[async_trait]
impl Planner for RegistryPlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::Registry
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::Registry(registry) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &registry.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, REGISTRY_HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, REGISTRY_HTTP_PORT)
        };
        let name = ctx.object_name();

        if spec.storage.file_system.is_some() && spec.storage.s3.is_some() {
            return Err(PlanError::InvalidSpec {
                field: "storage",
                message: "only one of fileSystem and s3 may be set".to_string(),
            });
        }
        let storage_directory = spec
            .storage
            .file_system
            .as_ref()
            .map_or_else(|| "/storage".to_string(), |fs| fs.root_directory.clone());

        let content = {
            let storage_directory = storage_directory.clone();
            ctx.render(
                self.uid(),
                spec,
                json!({ "port": port, "tls": tls }),
                vec![
                    (
                        "storage_directory",
                        Value::from_function(move || storage_directory.clone()),
                    ),
                    (
                        "certificate_directory",
                        Value::from_function(|| REGISTRY_CERTIFICATE_DIRECTORY),
                    ),
                    ("htpasswd_path", Value::from_function(|| HTPASSWD_PATH)),
                ],
            )?
        };
        let config = graph.add_config_map(
            resources::config_map(ctx, REGISTRY_CONFIG_KEY, content),
            &[],
        )?;
        let mut deps = vec![config];

        deps.push(graph.ensure_external_secret(&spec.http.secret_ref, Some(secret_type::SINGLE_KEY))?);
        let mut deployment = DeploymentPlan::new(
            REGISTRY_CONTAINER_NAME,
            ctx.image(self.uid(), &spec.component)?,
        )
        .args(vec!["serve".to_string(), REGISTRY_CONFIG_PATH.to_string()])
        .port(port_name, port)
        .probe(http_probe(REGISTRY_HEALTH_PATH, port, tls, None))
        .env(env_from_secret_key(
            "REGISTRY_HTTP_SECRET",
            &spec.http.secret_ref,
            secret_key::SECRET,
        ))
        .volume(
            resources::config_map_volume("config", &name),
            [mount_file("config", REGISTRY_CONFIG_PATH, REGISTRY_CONFIG_KEY)],
        );

        if let Some(s3) = &spec.storage.s3 {
            deps.push(graph.ensure_external_secret(&s3.secret_key_ref, None)?);
            deployment = deployment.env(env_from_secret_key(
                "REGISTRY_STORAGE_S3_SECRETKEY",
                &s3.secret_key_ref,
                secret_key::S3_SECRET_KEY,
            ));
        } else {
            let volume = spec
                .storage
                .file_system
                .as_ref()
                .map(|fs| fs.volume.clone())
                .unwrap_or_default();
            deployment = deployment.volume(
                resources::volume_from_source("storage", &volume),
                [mount("storage", &storage_directory, false)],
            );
        }

        if let Some(auth) = &spec.authentication {
            deps.push(graph.ensure_external_secret(&auth.htpasswd_ref, Some(secret_type::HTPASSWD))?);
            deployment = deployment.volume(
                resources::secret_volume(
                    "htpasswd",
                    &auth.htpasswd_ref,
                    &[(secret_key::HTPASSWD, "passwd")],
                ),
                [mount_file("htpasswd", HTPASSWD_PATH, "passwd")],
            );
        }

        if let Some(password_ref) = spec.redis.as_ref().and_then(|r| r.password_ref.as_ref()) {
            deps.push(graph.ensure_external_secret(password_ref, Some(secret_type::REDIS))?);
            deployment = deployment.env(env_from_secret_key(
                "REGISTRY_REDIS_PASSWORD",
                password_ref,
                secret_key::REDIS_PASSWORD,
            ));
        }

        if let Some(tls) = &spec.tls {
            deps.push(graph.ensure_external_secret(&tls.certificate_ref, Some(secret_type::TLS))?);
            deployment = deployment.volume(
                resources::secret_volume("certificate", &tls.certificate_ref, &[]),
                [mount("certificate", REGISTRY_CERTIFICATE_DIRECTORY, true)],
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

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryControllerPlanner;

#[async_trait]
impl Planner for RegistryControllerPlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::RegistryController
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::RegistryController(controller) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &controller.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, CONTROLLER_HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, CONTROLLER_HTTP_PORT)
        };
        let name = ctx.object_name();
        if spec.registry_ref.is_empty() {
            return Err(PlanError::InvalidSpec {
                field: "registryRef",
                message: "must name a Registry".to_string(),
            });
        }

        let content = ctx.render(
            self.uid(),
            spec,
            json!({ "port": port, "tls": tls }),
            vec![
                (
                    "registry_config_path",
                    Value::from_function(|| REGISTRY_CONFIG_PATH),
                ),
                (
                    "certificate_directory",
                    Value::from_function(|| CONTROLLER_CERTIFICATE_DIRECTORY),
                ),
            ],
        )?;
        let config = graph.add_config_map(
            resources::config_map(ctx, CONTROLLER_CONFIG_KEY, content),
            &[],
        )?;
        let mut deps = vec![config];
        for secret in [&spec.core_secret_ref, &spec.jobservice_secret_ref] {
            deps.push(graph.ensure_external_secret(secret, Some(secret_type::SINGLE_KEY))?);
        }

        // The Registry's own ConfigMap, owned by the Registry resource
        let registry_config = normalize_name(&spec.registry_ref, &[]);

        let mut deployment = DeploymentPlan::new(
            CONTROLLER_CONTAINER_NAME,
            ctx.image(self.uid(), &spec.component)?,
        )
        .port(port_name, port)
        .probe(http_probe(CONTROLLER_HEALTH_PATH, port, tls, None))
        .envs([
            resources::env("CONFIG_PATH", CONTROLLER_CONFIG_PATH),
            env_from_secret_key("CORE_SECRET", &spec.core_secret_ref, secret_key::SECRET),
            env_from_secret_key(
                "JOBSERVICE_SECRET",
                &spec.jobservice_secret_ref,
                secret_key::SECRET,
            ),
        ])
        .volume(
            resources::config_map_volume("config", &name),
            [mount_file("config", CONTROLLER_CONFIG_PATH, CONTROLLER_CONFIG_KEY)],
        )
        .volume(
            resources::config_map_volume("registry-config", &registry_config),
            [mount_file(
                "registry-config",
                REGISTRY_CONFIG_PATH,
                REGISTRY_CONFIG_KEY,
            )],
        );

        if let Some(tls) = &spec.tls {
            deps.push(graph.ensure_external_secret(&tls.certificate_ref, Some(secret_type::TLS))?);
            deployment = deployment.volume(
                resources::secret_volume("certificate", &tls.certificate_ref, &[]),
                [mount("certificate", CONTROLLER_CERTIFICATE_DIRECTORY, true)],
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
