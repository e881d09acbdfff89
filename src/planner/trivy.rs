//! Trivy: vulnerability scanner adapter, configured purely by environment.

use super::resources::{
    self, env, env_from_secret, env_from_secret_key, http_probe, mount, public_port,
    redis_url, DeploymentPlan, HTTPS_PORT_NAME, HTTP_PORT_NAME,
};
use super::secrets::{secret_key, secret_type};
use super::{PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::ComponentResource;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "trivy";
pub const HTTP_PORT: i32 = 8080;
pub const HTTPS_PORT: i32 = 8443;
pub const LIVENESS_PATH: &str = "/probe/healthy";
pub const READINESS_PATH: &str = "/probe/ready";

/// Derived secret keys
pub const REDIS_URL_KEYS: [&str; 3] = [
    "SCANNER_REDIS_URL",
    "SCANNER_STORE_REDIS_URL",
    "SCANNER_JOB_QUEUE_REDIS_URL",
];

const CACHE_DIRECTORY: &str = "/home/scanner/.cache/trivy";
const REPORTS_DIRECTORY: &str = "/home/scanner/.cache/reports";
const CERTIFICATE_DIRECTORY: &str = "/etc/trivy/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct TrivyPlanner;

#[async_trait]
impl Planner for TrivyPlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::Trivy
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::Trivy(trivy) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &trivy.spec;
        let tls = spec.tls.is_some();
        let (port_name, port) = if tls {
            (HTTPS_PORT_NAME, HTTPS_PORT)
        } else {
            (HTTP_PORT_NAME, HTTP_PORT)
        };
        let name = ctx.object_name();

        let mut secret_deps = Vec::new();
        let password = match &spec.redis.password_ref {
            Some(password_ref) => {
                secret_deps.push(graph.ensure_external_secret(password_ref, Some(secret_type::REDIS))?);
                ctx.read_secret_value(password_ref, secret_type::REDIS, secret_key::REDIS_PASSWORD)
                    .await?
            }
            None => String::new(),
        };
        let url = redis_url(&spec.redis, &password);
        let values: BTreeMap<String, String> = REDIS_URL_KEYS
            .iter()
            .map(|key| ((*key).to_string(), url.clone()))
            .collect();
        let redis = graph.add_secret(resources::derived_secret(ctx, values), &secret_deps)?;
        let mut deps = vec![redis];

        let server = &spec.server;
        let mut envs = vec![
            env("SCANNER_LOG_LEVEL", spec.log.as_str()),
            env("SCANNER_API_SERVER_ADDR", format!(":{port}")),
            env("SCANNER_TRIVY_CACHE_DIR", CACHE_DIRECTORY),
            env("SCANNER_TRIVY_REPORTS_DIR", REPORTS_DIRECTORY),
            env("SCANNER_TRIVY_SKIP_UPDATE", spec.update.skip.to_string()),
            env("SCANNER_TRIVY_INSECURE", server.insecure.to_string()),
            env("SCANNER_TRIVY_OFFLINE_SCAN", server.offline_scan.to_string()),
            env("SCANNER_TRIVY_IGNORE_UNFIXED", server.ignore_unfixed.to_string()),
        ];
        if let Some(severity) = &server.severity {
            envs.push(env("SCANNER_TRIVY_SEVERITY", severity.clone()));
        }
        if let Some(timeout) = &server.timeout {
            envs.push(env("SCANNER_TRIVY_TIMEOUT", timeout.clone()));
        }
        if let Some(token) = &spec.update.github_token_ref {
            deps.push(graph.ensure_external_secret(token, Some(secret_type::GITHUB))?);
            envs.push(env_from_secret_key(
                "SCANNER_TRIVY_GITHUB_TOKEN",
                token,
                secret_key::GITHUB_TOKEN,
            ));
        }

        let mut deployment = DeploymentPlan::new(CONTAINER_NAME, ctx.image(self.uid(), &spec.component)?)
            .port(port_name, port)
            .probes(
                http_probe(LIVENESS_PATH, port, tls, None),
                http_probe(READINESS_PATH, port, tls, None),
            )
            .envs(envs)
            .env_from(env_from_secret(&name, None))
            .volume(
                resources::volume_from_source("cache", &spec.storage.cache),
                [mount("cache", CACHE_DIRECTORY, false)],
            )
            .volume(
                resources::volume_from_source("reports", &spec.storage.reports),
                [mount("reports", REPORTS_DIRECTORY, false)],
            );

        if let Some(tls) = &spec.tls {
            deps.push(graph.ensure_external_secret(&tls.certificate_ref, Some(secret_type::TLS))?);
            deployment = deployment
                .env(env(
                    "SCANNER_API_SERVER_TLS_CERTIFICATE",
                    format!("{CERTIFICATE_DIRECTORY}/tls.crt"),
                ))
                .env(env(
                    "SCANNER_API_SERVER_TLS_KEY",
                    format!("{CERTIFICATE_DIRECTORY}/tls.key"),
                ))
                .volume(
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
