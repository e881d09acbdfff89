//! # Harbor Operator
//!
//! A Kubernetes operator that reconciles the custom resources of the Harbor
//! container registry components into cluster objects.
//!
//! ## Overview
//!
//! One controller per component kind (ChartMuseum, Core, JobService,
//! NotaryServer, NotarySigner, Portal, Registry, RegistryController, Trivy)
//! runs the same engine:
//!
//! 1. **Plan** - the component planner builds a dependency graph of the
//!    objects the component needs, rendering config files from templates
//! 2. **Realize** - the graph is applied in topological order with
//!    server-side apply, waiting on readiness along the edges
//! 3. **Report** - `InProgress`, `Failed` and `Applied` conditions are
//!    written to the resource status
//!
//! ## Features
//!
//! - **Layered configuration**: defaults, hot-reloaded template files and the
//!   environment behind one key/value store
//! - **Operator classes**: several operators share a cluster by class annotation
//! - **Rolling on config change**: pod templates carry a checksum of every
//!   ConfigMap and Secret they depend on
//! - **Prometheus metrics**, health/readiness probes and validating webhooks

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod filter;
pub mod graph;
pub mod observability;
pub mod planner;
pub mod runtime;
pub mod template;
