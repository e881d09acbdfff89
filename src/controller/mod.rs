//! # Controller
//!
//! Reconcile engine, controller registry, HTTP server and webhooks.

pub mod cluster;
pub mod reconciler;
pub mod server;
pub mod setup;
mod uid;
pub mod webhook;

pub use uid::ControllerUid;

/// Version reported in `status.operator.controllerVersion`
pub fn controller_version() -> String {
    format!("{}+{}", env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH"))
}
