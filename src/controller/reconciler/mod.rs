//! # Reconciler
//!
//! The component reconcile engine shared by every controller.
//!
//! One pass for one custom resource key:
//!
//! 1. **Fetch** the resource; a missing resource ends the pass (owner
//!    references cascade deletion)
//! 2. **Class check** against this operator's class filter
//! 3. **Plan** a fresh [`ResourceGraph`] with the component's planner
//! 4. **Realize** the graph in topological order (see [`realize`])
//! 5. **Status**: derive conditions and patch the status subresource
//! 6. **Requeue** with exponential backoff while anything is not ready;
//!    wait for the next change once applied or permanently failed
//!
//! The hosting controller never runs two passes for the same key at once.

mod backoff;
mod error;
mod readiness;
pub mod realize;
pub mod status;

pub use backoff::{BackoffState, ExponentialBackoff};
pub use error::ReconcilerError;
pub use readiness::Readiness;
pub use realize::{NodeOutcome, NodeReport, Realizer};
pub use status::{next_status, ConditionReport, PassSummary};

use crate::config::{ConfigError, SharedConfigStore};
use crate::controller::cluster::ClusterClient;
use crate::controller::ControllerUid;
use crate::crd::HarborComponent;
use crate::filter::ClassFilter;
use crate::graph::ResourceGraph;
use crate::observability;
use crate::planner::{planner_for, PlanContext, Planner};
use crate::template::TemplateRenderer;
use chrono::SecondsFormat;
use kube::api::ApiResource;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Context shared by every pass of one component controller
#[derive(Debug)]
pub struct Reconciler {
    uid: ControllerUid,
    cluster: Arc<dyn ClusterClient>,
    planner: Arc<dyn Planner>,
    store: SharedConfigStore,
    renderer: TemplateRenderer,
    filter: ClassFilter,
    backoff: ExponentialBackoff,
    controller_version: String,
    cancel: CancellationToken,
    /// Requeue backoff per `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Reconciler {
    /// Reconciler for `uid`, configured from `store`
    pub fn new(
        uid: ControllerUid,
        cluster: Arc<dyn ClusterClient>,
        store: SharedConfigStore,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            uid,
            cluster,
            planner: planner_for(uid),
            renderer: TemplateRenderer::new(Arc::clone(&store)),
            filter: ClassFilter::from_store(&store)?,
            backoff: ExponentialBackoff::from_store(&store)?,
            controller_version: super::controller_version(),
            cancel,
            store,
            backoff_states: Mutex::new(HashMap::new()),
        })
    }

    /// Replace the version reported in `status.operator.controllerVersion`
    #[must_use]
    pub fn with_controller_version(mut self, version: impl Into<String>) -> Self {
        self.controller_version = version.into();
        self
    }

    pub fn uid(&self) -> ControllerUid {
        self.uid
    }

    pub fn controller_version(&self) -> &str {
        &self.controller_version
    }

    pub fn filter(&self) -> &ClassFilter {
        &self.filter
    }

    /// Run one pass for `namespace/name`
    pub async fn reconcile_component<K: HarborComponent>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Action, ReconcilerError> {
        let kind = K::kind(&()).to_string();
        let key = format!("{namespace}/{name}");
        let api_resource = ApiResource::erase::<K>(&());

        let fetched = self
            .cluster
            .get_component(&api_resource, namespace, name)
            .await
            .map_err(|source| ReconcilerError::Fetch {
                kind: kind.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;
        let Some(object) = fetched else {
            debug!("resource no longer exists");
            self.forget(&key);
            return Ok(Action::await_change());
        };
        let resource: K = object
            .try_parse()
            .map_err(|e| ReconcilerError::InvalidResource {
                kind: kind.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: e.to_string(),
            })?;

        // The watch filter already applied this; a resource may have been
        // reassigned since the event was queued
        if !self.filter.accepts(&resource) {
            debug!(
                class = self.filter.class_name(),
                "resource belongs to another operator class"
            );
            self.forget(&key);
            return Ok(Action::await_change());
        }

        let Some(owner) = resource.controller_owner_ref(&()) else {
            return Err(ReconcilerError::InvalidResource {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: "metadata.uid is not set".to_string(),
            });
        };
        let generation = resource.meta().generation;
        let previous = resource.component_status().cloned();
        let component = Arc::new(resource).into_resource();

        let ctx = PlanContext {
            cluster: self.cluster.as_ref(),
            store: &self.store,
            renderer: &self.renderer,
            cancel: &self.cancel,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let mut graph = ResourceGraph::new();
        let summary = match self.planner.plan(&ctx, &component, &mut graph).await {
            Ok(()) => {
                debug!(nodes = graph.len(), "planned");
                let labels = ctx.labels();
                let realizer = Realizer {
                    cluster: self.cluster.as_ref(),
                    cancel: &self.cancel,
                    namespace,
                    owner: &owner,
                    labels: &labels,
                };
                let reports = realizer.realize(&graph).await;
                for report in &reports {
                    observability::metrics::increment_nodes_realized(
                        self.uid.as_str(),
                        report.kind.as_str(),
                        report.outcome.label(),
                    );
                }
                PassSummary::from_reports(&reports)
            }
            Err(e) if e.is_retryable() => {
                warn!(reason = e.reason(), error = %e, "planning incomplete");
                PassSummary::from_plan_error(&e)
            }
            Err(e) => {
                error!(reason = e.reason(), error = %e, "planning failed");
                PassSummary::from_plan_error(&e)
            }
        };

        if self.cancel.is_cancelled() {
            info!("reconcile cancelled, status left unchanged");
            return Ok(Action::await_change());
        }

        let now = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let status = next_status(
            previous.as_ref(),
            generation,
            &summary,
            &self.controller_version,
            &now,
        );
        if previous.as_ref() == Some(&status) {
            debug!("status unchanged");
        } else {
            self.cluster
                .patch_component_status(&api_resource, namespace, name, &status)
                .await
                .map_err(|source| ReconcilerError::StatusUpdate {
                    kind,
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    source,
                })?;
        }

        Ok(self.next_action(&key, &summary))
    }

    fn next_action(&self, key: &str, summary: &PassSummary) -> Action {
        if summary.is_failed() {
            self.forget(key);
            info!("failed permanently, waiting for the resource to change");
            return Action::await_change();
        }
        if summary.is_applied() {
            self.forget(key);
            info!("applied");
            return Action::await_change();
        }
        let delay = self.next_delay(key);
        debug!(delay_secs = delay.as_secs(), "in progress, requeueing");
        observability::metrics::increment_requeues_total(self.uid.as_str(), "in-progress");
        Action::requeue(delay)
    }

    /// Record a retry of `key` and return how long to wait
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states
            .entry(key.to_string())
            .or_default()
            .next_delay(&self.backoff)
    }

    /// Reset the backoff of `key`
    pub fn forget(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Controller entry point for component kind `K`
pub async fn reconcile<K: HarborComponent>(
    resource: Arc<K>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let span = tracing::info_span!(
        "controller.reconcile",
        controller = ctx.uid.as_str(),
        resource.name = %name,
        resource.namespace = %namespace,
    );

    async move {
        let started = Instant::now();
        observability::metrics::increment_reconciliations(ctx.uid.as_str());
        let result = ctx.reconcile_component::<K>(&namespace, &name).await;
        observability::metrics::observe_reconciliation_duration(
            ctx.uid.as_str(),
            started.elapsed().as_secs_f64(),
        );
        result
    }
    .instrument(span)
    .await
}

/// Controller error policy: back off on transient errors, park permanent ones
pub fn error_policy<K: HarborComponent>(
    resource: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let _guard = tracing::warn_span!(
        "controller.reconcile.error",
        controller = ctx.uid.as_str(),
        resource.name = %name,
        resource.namespace = %namespace,
    )
    .entered();

    observability::metrics::increment_reconciliation_errors(
        ctx.uid.as_str(),
        error.retryable_label(),
    );

    if !error.is_retryable() {
        error!(error = %error, "reconcile failed permanently");
        return Action::await_change();
    }

    let delay = ctx.next_delay(&format!("{namespace}/{name}"));
    warn!(error = %error, delay_secs = delay.as_secs(), "reconcile failed, retrying");
    observability::metrics::increment_requeues_total(ctx.uid.as_str(), "error-backoff");
    Action::requeue(delay)
}
