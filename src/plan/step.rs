// ABOUTME: Plan steps, their phase kinds, and the outcomes the runner produces.
// ABOUTME: Outcomes are immutable once created and serialize into the run report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Action;

/// Phase a step belongs to. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Preflight,
    Provision,
    Sync,
    ConfigCheck,
    ContainerUp,
    HealthCheck,
    CertReconcile,
    Cleanup,
}

impl StepKind {
    pub fn phase(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Preflight => "preflight",
            StepKind::Provision => "provision",
            StepKind::Sync => "sync",
            StepKind::ConfigCheck => "config-check",
            StepKind::ContainerUp => "container-up",
            StepKind::HealthCheck => "health-check",
            StepKind::CertReconcile => "cert-reconcile",
            StepKind::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    /// Identifies the end state this step converges to; unique within a plan.
    pub idempotency_key: String,
    pub action: Action,
    /// Compensating action, run when a failed first deployment has nothing to roll back to.
    pub rollback_action: Option<Action>,
    /// Names of earlier steps this one depends on.
    pub after: Vec<String>,
}

impl Step {
    /// The idempotency key defaults to `<kind>:<name>`.
    pub fn new(name: impl Into<String>, kind: StepKind, action: Action) -> Self {
        let name = name.into();
        Self {
            idempotency_key: format!("{kind}:{name}"),
            name,
            kind,
            action,
            rollback_action: None,
            after: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn with_rollback(mut self, action: Action) -> Self {
        self.rollback_action = Some(action);
        self
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.after.push(step.into());
        self
    }

    pub fn after_all<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(steps.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Desired end state already held; nothing was mutated.
    Satisfied,
    /// The step changed the host and the end state now holds.
    Applied,
    /// Not applicable to this run (e.g. no certificate domain).
    Skipped,
    Failed(String),
}

impl StepStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Satisfied => write!(f, "satisfied"),
            StepStatus::Applied => write!(f, "applied"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    /// Diagnostic captured from the failing command (exit code, stderr tail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepOutcome {
    pub fn new(step: &Step, status: StepStatus) -> Self {
        Self::named(&step.name, step.kind, status)
    }

    /// Outcome for a sub-step that has no plan entry of its own (disk cleanup, undo).
    pub fn named(step: impl Into<String>, kind: StepKind, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            kind,
            status,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
