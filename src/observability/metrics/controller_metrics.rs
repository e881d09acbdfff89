//! # Controller Metrics
//!
//! Reconcile metrics, every series labelled by controller UID.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["controller", "retryable"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "harbor_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["controller", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static NODES_REALIZED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_nodes_realized_total",
            "Total number of planned objects processed, by kind and outcome",
        ),
        &["controller", "kind", "outcome"],
    )
    .expect("Failed to create NODES_REALIZED_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NODES_REALIZED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

/// `retryable` is `"retryable"` or `"non-retryable"`
pub fn increment_reconciliation_errors(controller: &str, retryable: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller, retryable])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_requeues_total(controller: &str, reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[controller, reason]).inc();
}

pub fn increment_nodes_realized(controller: &str, kind: &str, outcome: &str) {
    NODES_REALIZED_TOTAL
        .with_label_values(&[controller, kind, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliations_are_counted_per_controller() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["portal"]).get();
        let other = RECONCILIATIONS_TOTAL.with_label_values(&["core"]).get();
        increment_reconciliations("portal");
        assert_eq!(
            RECONCILIATIONS_TOTAL.with_label_values(&["portal"]).get(),
            before + 1
        );
        assert_eq!(RECONCILIATIONS_TOTAL.with_label_values(&["core"]).get(), other);
    }

    #[test]
    fn test_errors_split_by_retryability() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["trivy", "non-retryable"])
            .get();
        increment_reconciliation_errors("trivy", "non-retryable");
        assert_eq!(
            RECONCILIATION_ERRORS_TOTAL
                .with_label_values(&["trivy", "non-retryable"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_duration_is_observed() {
        let before = RECONCILIATION_DURATION
            .with_label_values(&["registry"])
            .get_sample_count();
        observe_reconciliation_duration("registry", 0.25);
        assert_eq!(
            RECONCILIATION_DURATION
                .with_label_values(&["registry"])
                .get_sample_count(),
            before + 1
        );
    }

    #[test]
    fn test_nodes_realized_labels() {
        let before = NODES_REALIZED_TOTAL
            .with_label_values(&["chartmuseum", "Deployment", "applied"])
            .get();
        increment_nodes_realized("chartmuseum", "Deployment", "applied");
        increment_requeues_total("chartmuseum", "in-progress");
        assert_eq!(
            NODES_REALIZED_TOTAL
                .with_label_values(&["chartmuseum", "Deployment", "applied"])
                .get(),
            before + 1
        );
    }
}
