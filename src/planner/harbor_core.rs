//! Core: the Harbor API server.
//!
//! Core needs most of the platform wired in: the token service key, shared
//! secrets with jobservice and the registry, two Redis connections, the
//! PostgreSQL database and its encryption key, the CSRF key and the initial
//! admin password. Redis DSNs, which embed passwords, are assembled into an
//! operator-owned Secret exported to the container environment.

use super::resources::{
    self, env, env_from_secret, env_from_secret_key, http_probe, mount, mount_file,
    public_port, DeploymentPlan, HTTPS_PORT_NAME, HTTP_PORT_NAME,
};
use super::secrets::{secret_key, secret_type};
use super::{PlanContext, PlanError, Planner};
use crate::controller::ControllerUid;
use crate::crd::{ComponentResource, CoreSpec, RedisConnection};
use crate::graph::{NodeId, ResourceGraph};
use async_trait::async_trait;
use minijinja::Value;
use serde_json::json;
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "core";
pub const CONFIG_KEY: &str = "app.conf";
pub const HTTP_PORT: i32 = 8080;
pub const HTTPS_PORT: i32 = 8443;
pub const HEALTH_PATH: &str = "/api/v2.0/ping";
pub const HEALTH_PERIOD_SECONDS: i32 = 90;

/// Derived secret keys
pub const REDIS_URL_KEY: &str = "_REDIS_URL";
pub const REDIS_URL_REGISTRY_KEY: &str = "_REDIS_URL_REG";

const REDIS_MAX_CONNECTIONS: u32 = 100;
const DEFAULT_REDIS_IDLE_TIMEOUT_SECONDS: i64 = 30;

const CONFIG_PATH: &str = "/etc/core/app.conf";
const PRIVATE_KEY_PATH: &str = "/etc/core/private_key.pem";
const ENCRYPTION_KEY_PATH: &str = "/etc/core/key";
const CERTIFICATE_DIRECTORY: &str = "/etc/core/ssl";

#[derive(Debug, Default, Clone, Copy)]
pub struct CorePlanner;

/// `host:port,max,password,db,idleSeconds`
pub fn redis_dsn(connection: &RedisConnection, password: &str, idle_seconds: i64) -> String {
    format!(
        "{},{REDIS_MAX_CONNECTIONS},{password},{},{idle_seconds}",
        connection.address(),
        connection.database()
    )
}

impl CorePlanner {
    async fn redis_password(
        ctx: &PlanContext<'_>,
        graph: &mut ResourceGraph,
        connection: &RedisConnection,
        deps: &mut Vec<NodeId>,
    ) -> Result<String, PlanError> {
        let Some(password_ref) = &connection.password_ref else {
            return Ok(String::new());
        };
        deps.push(graph.ensure_external_secret(password_ref, Some(secret_type::REDIS))?);
        ctx.read_secret_value(password_ref, secret_type::REDIS, secret_key::REDIS_PASSWORD)
            .await
    }

    /// Derived secret holding both Redis DSNs
    async fn plan_redis_secret(
        ctx: &PlanContext<'_>,
        spec: &CoreSpec,
        graph: &mut ResourceGraph,
    ) -> Result<NodeId, PlanError> {
        let idle = spec
            .redis
            .idle_timeout_seconds
            .unwrap_or(DEFAULT_REDIS_IDLE_TIMEOUT_SECONDS);
        let mut secret_deps = Vec::new();

        let password = Self::redis_password(ctx, graph, &spec.redis.connection, &mut secret_deps).await?;
        let core_url = redis_dsn(&spec.redis.connection, &password, idle);

        let registry_url = match &spec.redis.registry_cache {
            Some(cache) => {
                let cache_password = Self::redis_password(ctx, graph, cache, &mut secret_deps).await?;
                redis_dsn(cache, &cache_password, idle)
            }
            None => core_url.clone(),
        };
        secret_deps.dedup();

        let values = BTreeMap::from([
            (REDIS_URL_KEY.to_string(), core_url),
            (REDIS_URL_REGISTRY_KEY.to_string(), registry_url),
        ]);
        Ok(graph.add_secret(resources::derived_secret(ctx, values), &secret_deps)?)
    }
}

#[async_trait]
impl Planner for CorePlanner {
    fn uid(&self) -> ControllerUid {
        ControllerUid::Core
    }

    async fn plan(
        &self,
        ctx: &PlanContext<'_>,
        resource: &ComponentResource,
        graph: &mut ResourceGraph,
    ) -> Result<(), PlanError> {
        let ComponentResource::Core(core) = resource else {
            return Err(PlanError::WrongResourceType {
                expected: self.uid(),
                actual: resource.uid(),
            });
        };
        let spec = &core.spec;
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
            json!({ "http_port": HTTP_PORT, "https_port": HTTPS_PORT, "tls": tls }),
            vec![(
                "certificate_directory",
                Value::from_function(|| CERTIFICATE_DIRECTORY),
            )],
        )?;
        let config = graph.add_config_map(resources::config_map(ctx, CONFIG_KEY, content), &[])?;
        let redis = Self::plan_redis_secret(ctx, spec, graph).await?;
        let mut deps = vec![config, redis];

        let mut single_key = |graph: &mut ResourceGraph, secret: &str| -> Result<(), PlanError> {
            deps.push(graph.ensure_external_secret(secret, Some(secret_type::SINGLE_KEY))?);
            Ok(())
        };
        single_key(graph, &spec.secret_ref)?;
        single_key(graph, &spec.jobservice.secret_ref)?;
        single_key(graph, &spec.components.registry.credentials.password_ref)?;
        single_key(graph, &spec.database.encryption_key_ref)?;
        single_key(graph, &spec.csrf_key_ref)?;
        single_key(graph, &spec.admin_initial_password_ref)?;
        deps.push(graph.ensure_external_secret(
            &spec.token_service.certificate_ref,
            Some(secret_type::TLS),
        )?);

        let database = &spec.database.connection;
        let mut envs = vec![
            env("CONFIG_PATH", CONFIG_PATH),
            env("LOG_LEVEL", spec.log.as_str()),
            env("EXT_ENDPOINT", spec.external_endpoint.clone()),
            env("PORTAL_URL", spec.components.portal_url.clone()),
            env("REGISTRY_URL", spec.components.registry.url.clone()),
            env(
                "REGISTRY_CONTROLLER_URL",
                spec.components.registry.controller_url.clone(),
            ),
            env(
                "REGISTRY_CREDENTIAL_USERNAME",
                spec.components.registry.credentials.username.clone(),
            ),
            env_from_secret_key(
                "REGISTRY_CREDENTIAL_PASSWORD",
                &spec.components.registry.credentials.password_ref,
                secret_key::SECRET,
            ),
            env("JOBSERVICE_URL", spec.jobservice.url.clone()),
            env_from_secret_key("JOBSERVICE_SECRET", &spec.jobservice.secret_ref, secret_key::SECRET),
            env_from_secret_key("CORE_SECRET", &spec.secret_ref, secret_key::SECRET),
            env_from_secret_key("CSRF_KEY", &spec.csrf_key_ref, secret_key::SECRET),
            env_from_secret_key(
                "HARBOR_ADMIN_PASSWORD",
                &spec.admin_initial_password_ref,
                secret_key::SECRET,
            ),
            env("KEY_PATH", ENCRYPTION_KEY_PATH),
            env("TOKEN_PRIVATE_KEY_PATH", PRIVATE_KEY_PATH),
            env("DATABASE_TYPE", "postgresql"),
            env("POSTGRESQL_HOST", database.host.clone()),
            env("POSTGRESQL_PORT", database.port().to_string()),
            env("POSTGRESQL_USERNAME", database.username.clone()),
            env("POSTGRESQL_DATABASE", database.database.clone()),
            env("POSTGRESQL_SSLMODE", database.ssl_mode()),
        ];
        if let Some(token_url) = &spec.token_service.url {
            envs.push(env("TOKEN_SERVICE_URL", token_url.clone()));
        }
        if let Some(password_ref) = &database.password_ref {
            deps.push(graph.ensure_external_secret(password_ref, Some(secret_type::POSTGRESQL))?);
            envs.push(env_from_secret_key(
                "POSTGRESQL_PASSWORD",
                password_ref,
                secret_key::POSTGRES_PASSWORD,
            ));
        }
        if let Some(idle) = spec.database.max_idle_connections {
            envs.push(env("POSTGRESQL_MAX_IDLE_CONNS", idle.to_string()));
        }
        if let Some(open) = spec.database.max_open_connections {
            envs.push(env("POSTGRESQL_MAX_OPEN_CONNS", open.to_string()));
        }
        let optional_urls = [
            ("CHART_REPOSITORY_URL", &spec.components.chart_repository_url),
            ("TRIVY_ADAPTER_URL", &spec.components.trivy_adapter_url),
            ("NOTARY_URL", &spec.components.notary_server_url),
        ];
        for (var, url) in optional_urls {
            if let Some(url) = url {
                envs.push(env(var, url.clone()));
            }
        }
        envs.push(env(
            "WITH_CHARTMUSEUM",
            spec.components.chart_repository_url.is_some().to_string(),
        ));
        envs.push(env(
            "WITH_TRIVY",
            spec.components.trivy_adapter_url.is_some().to_string(),
        ));
        envs.push(env(
            "WITH_NOTARY",
            spec.components.notary_server_url.is_some().to_string(),
        ));

        let mut deployment = DeploymentPlan::new(CONTAINER_NAME, ctx.image(self.uid(), &spec.component)?)
            .port(port_name, port)
            .probe(http_probe(HEALTH_PATH, port, tls, Some(HEALTH_PERIOD_SECONDS)))
            .envs(envs)
            .env_from(env_from_secret(&name, None))
            .volume(
                resources::config_map_volume("config", &name),
                [mount_file("config", CONFIG_PATH, CONFIG_KEY)],
            )
            .volume(
                resources::secret_volume(
                    "token-service-private-key",
                    &spec.token_service.certificate_ref,
                    &[(secret_key::TLS_KEY, "private_key.pem")],
                ),
                [mount_file(
                    "token-service-private-key",
                    PRIVATE_KEY_PATH,
                    "private_key.pem",
                )],
            )
            .volume(
                resources::secret_volume(
                    "encryption-key",
                    &spec.database.encryption_key_ref,
                    &[(secret_key::SECRET, "key")],
                ),
                [mount_file("encryption-key", ENCRYPTION_KEY_PATH, "key")],
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_dsn_format() {
        let connection = RedisConnection {
            host: "redis".to_string(),
            port: None,
            database: Some(2),
            password_ref: None,
        };
        assert_eq!(redis_dsn(&connection, "pw", 30), "redis:6379,100,pw,2,30");
        assert_eq!(redis_dsn(&connection, "", 30), "redis:6379,100,,2,30");
    }
}
