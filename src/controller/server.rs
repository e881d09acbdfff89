//! # HTTP Server
//!
//! Metrics, health probes and validating webhooks on one port.
//!
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /healthz`: OK once the server is serving
//! - `GET /readyz`: OK only when every registered named probe passes
//! - `POST /validate/{uid}`: validating webhook of an enabled component

use super::webhook;
use super::ControllerUid;
use crate::observability::metrics::REGISTRY;
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kube::api::DynamicObject;
use kube::core::admission::AdmissionReview;
use prometheus::{Encoder, TextEncoder};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Readiness check registered under a name
pub type ProbeCheck = Arc<dyn Fn() -> bool + Send + Sync>;

struct NamedProbe {
    name: String,
    check: ProbeCheck,
}

/// State shared by the HTTP handlers and the controller setup
pub struct ServerState {
    /// Set once the listener is bound
    pub is_ready: Arc<AtomicBool>,
    probes: RwLock<Vec<NamedProbe>>,
    webhooks: RwLock<HashSet<ControllerUid>>,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("is_ready", &self.is_ready.load(Ordering::Relaxed))
            .field("probes", &self.probe_names())
            .finish_non_exhaustive()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            probes: RwLock::new(Vec::new()),
            webhooks: RwLock::new(HashSet::new()),
        }
    }

    /// Register a readiness probe; `/readyz` fails while it returns false
    pub fn add_probe(&self, name: impl Into<String>, check: ProbeCheck) {
        let name = name.into();
        debug!(probe = %name, "registering readiness probe");
        self.probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(NamedProbe { name, check });
    }

    pub fn probe_names(&self) -> Vec<String> {
        self.probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|probe| probe.name.clone())
            .collect()
    }

    /// Names of the probes currently failing
    pub fn failing_probes(&self) -> Vec<String> {
        self.probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|probe| !(probe.check)())
            .map(|probe| probe.name.clone())
            .collect()
    }

    /// Serve `/validate/<uid>`
    pub fn register_webhook(&self, uid: ControllerUid) {
        info!(controller = uid.as_str(), "registering validating webhook");
        self.webhooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uid);
    }

    pub fn webhook_enabled(&self, uid: ControllerUid) -> bool {
        self.webhooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&uid)
    }
}

/// Routes served by the operator
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/validate/{uid}", post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `port` and serve until the process exits
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind HTTP server to port {port}"))?;
    info!(port, "HTTP server listening");
    state.is_ready.store(true, Ordering::Release);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&REGISTRY.gather(), &mut buffer) {
        Ok(()) => (
            [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ready_handler(State(state): State<Arc<ServerState>>) -> Response {
    if !state.is_ready.load(Ordering::Acquire) {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response();
    }
    let failing = state.failing_probes();
    if failing.is_empty() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("failing probes: {}", failing.join(", ")),
        )
            .into_response()
    }
}

async fn validate_handler(
    State(state): State<Arc<ServerState>>,
    Path(uid): Path<String>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Response {
    match ControllerUid::from_name(&uid).filter(|uid| state.webhook_enabled(*uid)) {
        Some(uid) => Json(webhook::review(uid, review)).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no webhook for '{uid}'")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_probes_are_reported_by_name() {
        let state = ServerState::new();
        let loaded = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&loaded);
        state.add_probe("core-template", Arc::new(move || flag.load(Ordering::Acquire)));
        state.add_probe("portal-template", Arc::new(|| true));

        assert_eq!(state.failing_probes(), vec!["core-template".to_string()]);
        loaded.store(true, Ordering::Release);
        assert!(state.failing_probes().is_empty());
    }

    #[test]
    fn test_webhooks_are_opt_in() {
        let state = ServerState::new();
        assert!(!state.webhook_enabled(ControllerUid::Core));
        state.register_webhook(ControllerUid::Core);
        assert!(state.webhook_enabled(ControllerUid::Core));
        assert!(!state.webhook_enabled(ControllerUid::Portal));
    }

    #[tokio::test]
    async fn test_readyz_waits_for_listener_and_probes() {
        let state = Arc::new(ServerState::new());
        let response = ready_handler(State(Arc::clone(&state))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.is_ready.store(true, Ordering::Release);
        state.add_probe("trivy-template", Arc::new(|| false));
        let response = ready_handler(State(Arc::clone(&state))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
