//! # Status Machine
//!
//! Derives the status subresource of a component from the outcome of one
//! reconcile pass.
//!
//! - `observedGeneration` is the generation the pass worked on
//! - `InProgress` is `True` while any planned object is not ready
//! - `Failed` is `True` when something failed in a way no retry can fix
//! - `Applied` is `True` when neither of the above holds
//!
//! `lastTransitionTime` moves only when a condition's status flips, so
//! watchers observe level edges rather than churn on every pass.

use super::realize::{NodeOutcome, NodeReport};
use crate::crd::{condition_status, condition_type, ComponentStatus, Condition, OperatorStatus};
use crate::planner::PlanError;

/// Reason and message of a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionReport {
    pub reason: String,
    pub message: String,
}

impl ConditionReport {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// What one pass found, reduced to the inputs of the status machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Set while at least one object is not ready
    pub in_progress: Option<ConditionReport>,
    /// Set when a non-retryable failure occurred
    pub failure: Option<ConditionReport>,
}

impl PassSummary {
    /// Summary of a realized graph
    pub fn from_reports(reports: &[NodeReport]) -> Self {
        let not_ready: Vec<&NodeReport> = reports.iter().filter(|r| !r.outcome.is_ready()).collect();
        let in_progress = (!not_ready.is_empty()).then(|| {
            let details: Vec<String> = not_ready
                .iter()
                .map(|report| format!("{}: {}", report.object(), report.outcome.describe()))
                .collect();
            ConditionReport::new(
                progress_reason(&not_ready),
                format!(
                    "{} of {} objects not ready: {}",
                    not_ready.len(),
                    reports.len(),
                    details.join("; ")
                ),
            )
        });

        let failures: Vec<String> = reports
            .iter()
            .filter(|report| report.outcome.is_permanent_failure())
            .map(|report| format!("{}: {}", report.object(), report.outcome.describe()))
            .collect();
        let failure = (!failures.is_empty())
            .then(|| ConditionReport::new("RealizationFailed", failures.join("; ")));

        Self {
            in_progress,
            failure,
        }
    }

    /// Summary of a pass that stopped while planning
    ///
    /// A retryable planner error (a secret that may still appear) keeps the
    /// resource in progress; anything else marks it failed.
    pub fn from_plan_error(error: &PlanError) -> Self {
        let report = ConditionReport::new(error.reason(), error.to_string());
        if error.is_retryable() {
            Self {
                in_progress: Some(report),
                failure: None,
            }
        } else {
            Self {
                in_progress: None,
                failure: Some(report),
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        self.in_progress.is_none() && self.failure.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

fn progress_reason(not_ready: &[&NodeReport]) -> &'static str {
    if not_ready
        .iter()
        .any(|report| matches!(report.outcome, NodeOutcome::Failed { .. }))
    {
        "RealizationError"
    } else if not_ready
        .iter()
        .any(|report| matches!(report.outcome, NodeOutcome::Pending { .. }))
    {
        "DependencyMissing"
    } else {
        "WaitingForReadiness"
    }
}

/// Next status of a component
///
/// Conditions of other types found in `previous` are kept after the three
/// managed ones.
pub fn next_status(
    previous: Option<&ComponentStatus>,
    generation: Option<i64>,
    summary: &PassSummary,
    controller_version: &str,
    now: &str,
) -> ComponentStatus {
    let applied = summary.is_applied().then(|| {
        ConditionReport::new("Applied", "all objects are applied and ready")
    });

    let mut conditions = vec![
        condition(
            previous,
            condition_type::IN_PROGRESS,
            summary.in_progress.as_ref(),
            now,
        ),
        condition(previous, condition_type::FAILED, summary.failure.as_ref(), now),
        condition(previous, condition_type::APPLIED, applied.as_ref(), now),
    ];
    if let Some(previous) = previous {
        conditions.extend(
            previous
                .conditions
                .iter()
                .filter(|c| !is_managed_condition(&c.r#type))
                .cloned(),
        );
    }

    ComponentStatus {
        observed_generation: generation,
        conditions,
        operator: OperatorStatus {
            controller_version: Some(controller_version.to_string()),
        },
    }
}

fn is_managed_condition(condition: &str) -> bool {
    [
        condition_type::IN_PROGRESS,
        condition_type::FAILED,
        condition_type::APPLIED,
    ]
    .contains(&condition)
}

fn condition(
    previous: Option<&ComponentStatus>,
    condition_type: &str,
    report: Option<&ConditionReport>,
    now: &str,
) -> Condition {
    let status = if report.is_some() {
        condition_status::TRUE
    } else {
        condition_status::FALSE
    };
    let last_transition_time = previous
        .and_then(|p| p.condition(condition_type))
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.to_string());

    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(last_transition_time),
        reason: report.map(|r| r.reason.clone()),
        message: report.map(|r| r.message.clone()),
    }
}
