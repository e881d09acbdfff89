//! # Initialization
//!
//! Operator bootstrap: rustls setup, configuration, tracing, metrics, server
//! startup, Kubernetes client setup and controller registration.

use super::Args;
use crate::config::{self, ServerConfig, SharedConfigStore};
use crate::constants::keys;
use crate::controller::cluster::KubeClusterClient;
use crate::controller::server::{start_server, ServerState};
use crate::controller::setup::{self, SetupContext};
use crate::observability;
use crate::observability::logging::LogSettings;
use anyhow::{Context, Result};
use kube::Client;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything [`run`] needs
pub struct InitializationResult {
    pub client: Client,
    pub setup: SetupContext,
    /// `None` watches every namespace
    pub namespace: Option<String>,
    pub cancel: CancellationToken,
}

impl fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationResult")
            .field("setup", &self.setup)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// - rustls crypto provider
/// - configuration store with command-line overrides
/// - tracing subscriber and metrics
/// - HTTP server, awaited until it accepts connections
/// - Kubernetes client
/// - template watch and signal handling
pub async fn initialize(args: &Args) -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    let rustls_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let (store, _defaults, files) = config::build_store(Some(crate::constants::ENV_PREFIX));
    config::register_overrides(&store, args.overrides());

    let log_settings = LogSettings::from_store(&store).context("invalid logging configuration")?;
    observability::logging::init_tracing(&log_settings)?;
    if !rustls_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Harbor operator");
    info!(
        timestamp = env!("BUILD_TIMESTAMP"),
        datetime = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        version = %crate::controller::controller_version(),
        "build info"
    );

    observability::metrics::register_metrics()?;

    let server_config = ServerConfig::from_store(&store).context("invalid server configuration")?;
    let server_state = Arc::new(ServerState::new());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!(error = %e, "HTTP server error");
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let interval = template_watch_interval(&store)?;
    Arc::clone(&files).spawn_watch(interval, cancel.clone());

    let namespace = Some(store.get_string_or(keys::WATCH_NAMESPACE, "")?)
        .filter(|namespace| !namespace.is_empty());
    match &namespace {
        Some(namespace) => info!(namespace = %namespace, "watching a single namespace"),
        None => info!("watching all namespaces"),
    }

    Ok(InitializationResult {
        setup: SetupContext {
            cluster: Arc::new(KubeClusterClient::new(client.clone())),
            store,
            files,
            server: server_state,
            cancel: cancel.clone(),
        },
        client,
        namespace,
        cancel,
    })
}

/// Register the controllers and drive them until shutdown
pub async fn run(init: InitializationResult) -> Result<()> {
    let controllers = setup::setup(&init.setup, &init.client, init.namespace.as_deref())
        .await
        .context("controller setup failed")?;
    info!(controllers = controllers.len(), "controllers started");

    futures::future::join_all(controllers).await;

    init.cancel.cancel();
    info!("controllers stopped");
    Ok(())
}

fn template_watch_interval(store: &SharedConfigStore) -> Result<Duration> {
    let secs = store.get_int_or(
        keys::TEMPLATE_WATCH_INTERVAL,
        i64::try_from(crate::constants::DEFAULT_TEMPLATE_WATCH_INTERVAL_SECS)
            .unwrap_or(i64::MAX),
    )?;
    let secs = u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .with_context(|| format!("{} must be a positive number of seconds", keys::TEMPLATE_WATCH_INTERVAL))?;
    Ok(Duration::from_secs(secs))
}

/// Cancel `cancel` on SIGINT or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        cancel.cancel();
    });
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Acquire)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
