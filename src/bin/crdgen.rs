//! Prints every Harbor component CRD as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/harbor-operator.yaml
//! ```

use anyhow::{Context, Result};
use harbor_operator::crd::all_crds;

fn main() -> Result<()> {
    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        let yaml =
            serde_yaml::to_string(&crd).with_context(|| format!("failed to serialize CRD {name}"))?;
        println!("---");
        print!("{yaml}");
    }
    Ok(())
}
