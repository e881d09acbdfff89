//! # Harbor Operator
//!
//! Kubernetes operator reconciling Harbor component custom resources
//! (`goharbor.io/v1beta1`) into Deployments, Services, ConfigMaps, Secrets
//! and NetworkPolicies.

use anyhow::Result;
use clap::Parser;
use harbor_operator::runtime::{self, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let init = runtime::initialize(&args).await?;
    runtime::run(init).await
}
