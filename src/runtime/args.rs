//! Command-line arguments of the operator binary.

use clap::Parser;

/// Harbor operator: reconciles Harbor component custom resources
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "harbor-operator", version, about)]
pub struct Args {
    /// Port of the metrics, health and webhook server
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Only watch resources in this namespace (default: all namespaces)
    #[arg(long)]
    pub watch_namespace: Option<String>,
}

impl Args {
    /// Configuration overrides as store key/value pairs
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(port) = self.metrics_port {
            overrides.push((crate::constants::keys::METRICS_PORT, port.to_string()));
        }
        if let Some(namespace) = &self.watch_namespace {
            overrides.push((crate::constants::keys::WATCH_NAMESPACE, namespace.clone()));
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_overrides() {
        let args =
            Args::try_parse_from(["harbor-operator", "--metrics-port", "9090", "--watch-namespace", "harbor"])
                .unwrap();
        assert_eq!(
            args.overrides(),
            vec![
                ("metrics-port", "9090".to_string()),
                ("watch-namespace", "harbor".to_string())
            ]
        );
    }

    #[test]
    fn test_no_flags_no_overrides() {
        let args = Args::try_parse_from(["harbor-operator"]).unwrap();
        assert!(args.overrides().is_empty());
    }
}
