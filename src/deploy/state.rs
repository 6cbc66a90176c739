// ABOUTME: Run state machine for the orchestrator.
// ABOUTME: Forward along the phase order, or sideways into Failing and its two endings.

use std::fmt;

use crate::plan::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preflighting,
    Provisioning,
    Syncing,
    ConfigValidating,
    ContainersStarting,
    HealthChecking,
    CertReconciling,
    CleaningUp,
    Done,
    Failing,
    RolledBack,
    ReportedFailure,
}

impl RunState {
    /// State the orchestrator is in while running a step of `kind`.
    pub fn for_kind(kind: StepKind) -> Self {
        match kind {
            StepKind::Preflight => RunState::Preflighting,
            StepKind::Provision => RunState::Provisioning,
            StepKind::Sync => RunState::Syncing,
            StepKind::ConfigCheck => RunState::ConfigValidating,
            StepKind::ContainerUp => RunState::ContainersStarting,
            StepKind::HealthCheck => RunState::HealthChecking,
            StepKind::CertReconcile => RunState::CertReconciling,
            StepKind::Cleanup => RunState::CleaningUp,
        }
    }

    /// Position on the forward path; `None` for the failure states.
    fn rank(self) -> Option<u8> {
        let rank = match self {
            RunState::Idle => 0,
            RunState::Preflighting => 1,
            RunState::Provisioning => 2,
            RunState::Syncing => 3,
            RunState::ConfigValidating => 4,
            RunState::ContainersStarting => 5,
            RunState::HealthChecking => 6,
            RunState::CertReconciling => 7,
            RunState::CleaningUp => 8,
            RunState::Done => 9,
            RunState::Failing | RunState::RolledBack | RunState::ReportedFailure => return None,
        };
        Some(rank)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::RolledBack | RunState::ReportedFailure
        )
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Failing, RunState::RolledBack | RunState::ReportedFailure) => true,
            (RunState::Failing, _) => false,
            (current, _) if current.is_terminal() => false,
            (_, RunState::Failing) => true,
            (RunState::Idle, RunState::Done) => false,
            (current, next) => match (current.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
