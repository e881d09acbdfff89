//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controllers.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Per-controller reconcile metrics, labelled by controller UID

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
