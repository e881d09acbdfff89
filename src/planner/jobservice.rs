//! JobService: asynchronous job runner.

use super::resources::{
    self, env, env_from_secret, env_from_secret_key, http_probe, mount, mount_file,
    public_port, redis_url, DeploymentPlan, HTTPS_PORT_NAME, HTTP_PORT_NAME,
};
use super::secrets::{secret_key, secret_type};
use super::{PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::{ComponentResource, JobServiceLoggersSpec};
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use minijinja::Value;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "jobservice";
pub const CONFIG_KEY: &str = "config.yaml";
pub const HTTP_PORT: i32 = 8080;
pub const HTTPS_PORT: i32 = 8443;
pub const HEALTH_PATH: &str = "/api/v1/stats";

/// Derived secret key
pub const POOL_REDIS_URL_KEY: &str = "JOB_SERVICE_POOL_REDIS_URL";

/// Parent directory of the `logs-<i>` mounts
pub const LOGS_DIRECTORY: &str = "/mnt/logs";
/// Parent directory of the `joblogs-<i>` mounts
pub const JOB_LOGS_DIRECTORY: &str = "/mnt/joblogs";

const CONFIG_PATH: &str = "/etc/jobservice/config.yml";
const CERTIFICATE_DIRECTORY: &str = "/etc/jobservice/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct JobServicePlanner;

/// One entry of a logger list in the rendered configuration
#[derive(Debug, Serialize)]
struct LoggerEntry {
    name: &'static str,
    level: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sweeper_days: Option<i32>,
}

/// Logger entries plus the volume and mount of every file logger
fn loggers(
    spec: &JobServiceLoggersSpec,
    volume_prefix: &str,
    parent: &str,
) -> (Vec<LoggerEntry>, Vec<(Volume, VolumeMount)>) {
    let mut entries = Vec::new();
    let mut volumes = Vec::new();

    if let Some(stdout) = &spec.stdout {
        entries.push(LoggerEntry {
            name: "STD_OUTPUT",
            level: stdout.level.as_upper_str(),
            directory: None,
            sweeper_days: None,
        });
    }
    for (index, file) in spec.files.iter().enumerate() {
        let volume = format!("{volume_prefix}-{index}");
        let directory = format!("{parent}/{index}");
        entries.push(LoggerEntry {
            name: "FILE",
            level: file.level.as_upper_str(),
            directory: Some(directory.clone()),
            sweeper_days: Some(file.sweeper_days),
        });
        volumes.push((
            resources::volume_from_source(&volume, &file.volume),
            mount(&volume, &directory, false),
        ));
    }
    (entries, volumes)
}

#[async_trait]
impl Planner for JobServicePlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::JobService
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::JobService(jobservice) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &jobservice.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, HTTP_PORT)
        };
        let name = ctx.object_name();

        let (logger_entries, logger_volumes) = loggers(&spec.loggers, "logs", LOGS_DIRECTORY);
        let (job_logger_entries, job_logger_volumes) =
            loggers(&spec.job_loggers, "joblogs", JOB_LOGS_DIRECTORY);

        let content = ctx.render(
            self.uid(),
            spec,
            json!({
                "port": port,
                "tls": tls,
                "loggers": logger_entries,
                "job_loggers": job_logger_entries,
            }),
            vec![(
                "certificate_directory",
                Value::from_function(|| CERTIFICATE_DIRECTORY),
            )],
        )?;
        let config = graph.add_config_map(resources::config_map(ctx, CONFIG_KEY, content), &[])?;

        let redis = &spec.worker_pool.redis;
        let mut secret_deps = Vec::new();
        let password = match &redis.password_ref {
            Some(password_ref) => {
                secret_deps.push(graph.ensure_external_secret(password_ref, Some(secret_type::REDIS))?);
                ctx.read_secret_value(password_ref, secret_type::REDIS, secret_key::REDIS_PASSWORD)
                    .await?
            }
            None => String::new(),
        };
        let pool = graph.add_secret(
            resources::derived_secret(
                ctx,
                BTreeMap::from([(POOL_REDIS_URL_KEY.to_string(), redis_url(redis, &password))]),
            ),
            &secret_deps,
        )?;

        let mut deps = vec![config, pool];
        for secret in [
            &spec.core.secret_ref,
            &spec.secret_ref,
            &spec.registry.credentials.password_ref,
        ] {
            deps.push(graph.ensure_external_secret(secret, Some(secret_type::SINGLE_KEY))?);
        }

        let mut deployment = DeploymentPlan::new(CONTAINER_NAME, ctx.image(self.uid(), &spec.component)?)
            .port(port_name, port)
            .probe(http_probe(HEALTH_PATH, port, tls, None))
            .envs([
                env("CONFIG_PATH", CONFIG_PATH),
                env("CORE_URL", spec.core.url.clone()),
                env_from_secret_key("CORE_SECRET", &spec.core.secret_ref, secret_key::SECRET),
                env_from_secret_key("JOBSERVICE_SECRET", &spec.secret_ref, secret_key::SECRET),
                env("REGISTRY_URL", spec.registry.url.clone()),
                env("REGISTRY_CONTROLLER_URL", spec.registry.controller_url.clone()),
                env(
                    "REGISTRY_CREDENTIAL_USERNAME",
                    spec.registry.credentials.username.clone(),
                ),
                env_from_secret_key(
                    "REGISTRY_CREDENTIAL_PASSWORD",
                    &spec.registry.credentials.password_ref,
                    secret_key::SECRET,
                ),
            ])
            .env_from(env_from_secret(&name, None))
            .volume(
                resources::config_map_volume("config", &name),
                [mount_file("config", CONFIG_PATH, CONFIG_KEY)],
            );

        for (volume, volume_mount) in logger_volumes.into_iter().chain(job_logger_volumes) {
            deployment = deployment.volume(volume, [volume_mount]);
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
