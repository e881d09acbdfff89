//! # Controller Setup
//!
//! Registers one controller per component kind.
//!
//! For each [`ControllerUid`] the registry checks `<uid>-controller-disabled`;
//! an enabled controller gets a [`Reconciler`], a `<uid>-template` readiness
//! probe and, unless `<uid>-webhook-disabled` is set, a validating webhook.
//! Registrations run concurrently and the first error aborts startup.

use super::cluster::ClusterClient;
use super::reconciler::{error_policy, reconcile, Reconciler, ReconcilerError};
use super::server::ServerState;
use super::ControllerUid;
use crate::config::{template_callback, ConfigError, FileWatchProvider, SharedConfigStore};
use crate::constants::{self, keys, WATCH_TIMEOUT_SECS};
use crate::crd::{
    ChartMuseum, Core, HarborComponent, JobService, NotaryServer, NotarySigner, Portal,
    Registry, RegistryController, Trivy,
};
use crate::filter::ClassTracker;
use crate::template::builtin_template;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::runtime::controller::{self, Controller};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A running controller; completes when the controller shuts down
pub type ControllerFuture = BoxFuture<'static, ()>;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("controller {uid}: {source}")]
    Config {
        uid: ControllerUid,
        #[source]
        source: ConfigError,
    },

    #[error("invalid operator setting: {0}")]
    Operator(#[source] ConfigError),
}

impl SetupError {
    fn config(uid: ControllerUid) -> impl FnOnce(ConfigError) -> Self {
        move |source| SetupError::Config { uid, source }
    }
}

/// Everything the registry needs to build controllers
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub cluster: Arc<dyn ClusterClient>,
    pub store: SharedConfigStore,
    pub files: Arc<FileWatchProvider>,
    pub server: Arc<ServerState>,
    pub cancel: CancellationToken,
}

/// Prepare the reconciler of `uid`, or `None` when the controller is disabled
///
/// Registers the webhook and the template readiness probe as side effects.
pub fn prepare(
    ctx: &SetupContext,
    uid: ControllerUid,
) -> Result<Option<Arc<Reconciler>>, SetupError> {
    let name = uid.as_str();
    let store = &ctx.store;

    if store
        .get_bool_or(&keys::controller_disabled(name), false)
        .map_err(SetupError::config(uid))?
    {
        info!(controller = name, "controller disabled");
        return Ok(None);
    }

    if !store
        .get_bool_or(&keys::webhook_disabled(name), false)
        .map_err(SetupError::config(uid))?
    {
        ctx.server.register_webhook(uid);
    }

    let template_path = store
        .get_string_or(&keys::template_path(name), "")
        .map_err(SetupError::config(uid))?;
    let probe = format!("{name}-template");
    if !template_path.is_empty() {
        let handle = ctx
            .files
            .watch(&template_path, template_callback(name))
            .map_err(SetupError::config(uid))?;
        info!(controller = name, path = %template_path, "watching config template");
        ctx.server
            .add_probe(probe, Arc::new(move || handle.is_loaded()));
    } else if builtin_template(uid).is_some() {
        debug!(controller = name, "using built-in config template");
        ctx.server.add_probe(probe, Arc::new(|| true));
    }

    let reconciler = Reconciler::new(
        uid,
        Arc::clone(&ctx.cluster),
        Arc::clone(&ctx.store),
        ctx.cancel.clone(),
    )
    .map_err(SetupError::config(uid))?;
    info!(
        controller = name,
        class = reconciler.filter().class_name(),
        "controller registered"
    );
    Ok(Some(Arc::new(reconciler)))
}

/// Prepare every enabled controller concurrently
pub async fn prepare_all(
    ctx: &SetupContext,
) -> Result<Vec<Arc<Reconciler>>, SetupError> {
    let prepared = future::try_join_all(
        ControllerUid::ALL
            .into_iter()
            .map(|uid| async move { prepare(ctx, uid) }),
    )
    .await?;
    Ok(prepared.into_iter().flatten().collect())
}

/// Register every enabled controller and return their run futures
pub async fn setup(
    ctx: &SetupContext,
    client: &Client,
    namespace: Option<&str>,
) -> Result<Vec<ControllerFuture>, SetupError> {
    let concurrency = ctx
        .store
        .get_int_or(
            keys::MAX_CONCURRENT_RECONCILES,
            i64::from(constants::DEFAULT_MAX_CONCURRENT_RECONCILES),
        )
        .and_then(|value| {
            u16::try_from(value)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: keys::MAX_CONCURRENT_RECONCILES.to_string(),
                    value: value.to_string(),
                    expected: "a positive integer",
                })
        })
        .map_err(SetupError::Operator)?;

    let reconcilers = prepare_all(ctx).await?;
    Ok(reconcilers
        .into_iter()
        .map(|reconciler| {
            let client = client.clone();
            match reconciler.uid() {
                ControllerUid::ChartMuseum => {
                    controller_for::<ChartMuseum>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::Core => {
                    controller_for::<Core>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::JobService => {
                    controller_for::<JobService>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::NotaryServer => {
                    controller_for::<NotaryServer>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::NotarySigner => {
                    controller_for::<NotarySigner>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::Portal => {
                    controller_for::<Portal>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::Registry => {
                    controller_for::<Registry>(client, namespace, reconciler, concurrency)
                }
                ControllerUid::RegistryController => controller_for::<RegistryController>(
                    client,
                    namespace,
                    reconciler,
                    concurrency,
                ),
                ControllerUid::Trivy => {
                    controller_for::<Trivy>(client, namespace, reconciler, concurrency)
                }
            }
        })
        .collect())
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    match namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

/// Controller of kind `K`, watching `K` through the class filter and every
/// object kind the planners produce
fn controller_for<K: HarborComponent>(
    client: Client,
    namespace: Option<&str>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
) -> ControllerFuture {
    let uid = reconciler.uid();
    let watch_config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);

    let mut tracker = ClassTracker::new(reconciler.filter().clone());
    let (reader, writer) = reflector::store();
    let stream = watcher(scoped_api::<K>(client.clone(), namespace), watch_config.clone())
        .default_backoff()
        .filter(move |event| {
            let admit = event.as_ref().map_or(true, |event| tracker.admit(event));
            future::ready(admit)
        })
        .reflect(writer)
        .applied_objects();

    Controller::for_stream(stream, reader)
        .owns(
            scoped_api::<Deployment>(client.clone(), namespace),
            watch_config.clone(),
        )
        .owns(
            scoped_api::<Service>(client.clone(), namespace),
            watch_config.clone(),
        )
        .owns(
            scoped_api::<ConfigMap>(client.clone(), namespace),
            watch_config.clone(),
        )
        .owns(
            scoped_api::<Secret>(client.clone(), namespace),
            watch_config.clone(),
        )
        .owns(scoped_api::<NetworkPolicy>(client, namespace), watch_config)
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, reconciler)
        .for_each(move |result| async move {
            log_reconcile_result(uid, result);
        })
        .boxed()
}

fn log_reconcile_result<K: Resource<DynamicType = ()>>(
    uid: ControllerUid,
    result: Result<
        (reflector::ObjectRef<K>, kube::runtime::controller::Action),
        controller::Error<ReconcilerError, watcher::Error>,
    >,
) {
    match result {
        Ok((object, _)) => debug!(
            controller = uid.as_str(),
            resource.name = %object.name,
            resource.namespace = object.namespace.as_deref().unwrap_or_default(),
            "reconciled"
        ),
        Err(controller::Error::ReconcilerFailed(error, object)) => debug!(
            controller = uid.as_str(),
            resource.name = %object.name,
            error = %error,
            "reconcile pass returned an error"
        ),
        Err(controller::Error::ObjectNotFound(object)) => debug!(
            controller = uid.as_str(),
            resource.name = %object.name,
            "object no longer in cache"
        ),
        Err(e) => warn!(controller = uid.as_str(), error = %e, "controller stream error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoCluster;

    #[async_trait::async_trait]
    impl ClusterClient for NoCluster {
        async fn get_component(
            &self,
            _resource: &kube::api::ApiResource,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<kube::api::DynamicObject>, kube::Error> {
            Ok(None)
        }

        async fn patch_component_status(
            &self,
            _resource: &kube::api::ApiResource,
            _namespace: &str,
            _name: &str,
            _status: &crate::crd::ComponentStatus,
        ) -> Result<(), kube::Error> {
            Ok(())
        }

        async fn get(
            &self,
            _namespace: &str,
            _kind: crate::graph::NodeKind,
            _name: &str,
        ) -> Result<Option<crate::graph::NodeObject>, kube::Error> {
            Ok(None)
        }

        async fn apply(
            &self,
            _namespace: &str,
            object: &crate::graph::NodeObject,
        ) -> Result<crate::graph::NodeObject, kube::Error> {
            Ok(object.clone())
        }

        async fn get_secret(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<Secret>, kube::Error> {
            Ok(None)
        }
    }

    fn context(items: &[(&str, &str)]) -> SetupContext {
        let (store, defaults, files) = crate::config::build_store(Some("SETUP_TEST_UNUSED"));
        for (key, value) in items {
            defaults.set(*key, *value);
        }
        SetupContext {
            cluster: Arc::new(NoCluster),
            store,
            files,
            server: Arc::new(ServerState::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_every_controller_is_enabled_by_default() {
        let ctx = context(&[]);
        let reconcilers = prepare_all(&ctx).await.unwrap();
        assert_eq!(reconcilers.len(), ControllerUid::ALL.len());
        for uid in ControllerUid::ALL {
            assert!(ctx.server.webhook_enabled(uid));
        }
        // Trivy has no config template and so no template probe
        assert_eq!(ctx.server.probe_names().len(), ControllerUid::ALL.len() - 1);
        assert!(ctx.server.failing_probes().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_controller_and_webhook_are_skipped() {
        let ctx = context(&[
            ("portal-controller-disabled", "true"),
            ("core-webhook-disabled", "true"),
        ]);
        let reconcilers = prepare_all(&ctx).await.unwrap();
        assert!(reconcilers.iter().all(|r| r.uid() != ControllerUid::Portal));
        assert!(!ctx.server.webhook_enabled(ControllerUid::Portal));
        assert!(!ctx.server.webhook_enabled(ControllerUid::Core));
        assert!(ctx.server.webhook_enabled(ControllerUid::Registry));
        assert!(!ctx
            .server
            .probe_names()
            .contains(&"portal-template".to_string()));
    }

    #[tokio::test]
    async fn test_template_probe_follows_watched_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.conf.tmpl");
        let path_value = path.display().to_string();
        let ctx = context(&[("core-template-path", path_value.as_str())]);

        prepare(&ctx, ControllerUid::Core).unwrap().unwrap();
        assert_eq!(ctx.server.failing_probes(), vec!["core-template".to_string()]);

        std::fs::write(&path, "appname = Harbor").unwrap();
        ctx.files.reload_changed();
        assert!(ctx.server.failing_probes().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_gate_aborts_setup() {
        let ctx = context(&[("registry-controller-disabled", "maybe")]);
        let error = prepare_all(&ctx).await.unwrap_err();
        assert!(error.to_string().starts_with("controller registry"));
    }
}
