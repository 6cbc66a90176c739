// ABOUTME: Deployment plans: ordered, validated sequences of idempotent steps.
// ABOUTME: Also holds the run report model and the plan builders for each command.

mod action;
mod builder;
mod report;
mod step;

pub use action::{Action, CertTarget, EnvEntries};
pub use builder::{PlanInputs, deploy_plan, provision_plan, renew_plan, ssl_setup_plan};
pub use report::{FailureSummary, ReportLog, RunReport, RunStatus};
pub use step::{Step, StepKind, StepOutcome, StepStatus};

use std::collections::HashSet;

/// Reasons a step list is not a valid plan.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan has no steps")]
    Empty,

    #[error("duplicate step name: {0}")]
    DuplicateName(String),

    #[error("duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("step '{step}' depends on '{dependency}', which is not an earlier step")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{step}' ({kind}) cannot run after a {previous} step")]
    PhaseRegression {
        step: String,
        kind: StepKind,
        previous: StepKind,
    },
}

/// Ordered steps for one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    steps: Vec<Step>,
}

impl DeploymentPlan {
    /// Validate ordering, uniqueness, and dependencies.
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut names: HashSet<&str> = HashSet::new();
        let mut keys: HashSet<&str> = HashSet::new();
        let mut previous: Option<StepKind> = None;

        for step in &steps {
            for dependency in &step.after {
                if !names.contains(dependency.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            if !names.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateName(step.name.clone()));
            }
            if !keys.insert(step.idempotency_key.as_str()) {
                return Err(PlanError::DuplicateKey(step.idempotency_key.clone()));
            }

            if let Some(prev) = previous
                && step.kind < prev
            {
                return Err(PlanError::PhaseRegression {
                    step: step.name.clone(),
                    kind: step.kind,
                    previous: prev,
                });
            }
            previous = Some(step.kind);
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn step(name: &str, kind: StepKind) -> Step {
        Step::new(name, kind, Action::PruneImages)
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert_eq!(DeploymentPlan::new(vec![]).unwrap_err(), PlanError::Empty);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = DeploymentPlan::new(vec![
            step("a", StepKind::Sync),
            step("a", StepKind::Cleanup),
        ])
        .unwrap_err();
        assert_eq!(err, PlanError::DuplicateName("a".to_string()));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = DeploymentPlan::new(vec![
            step("a", StepKind::Sync).with_key("k"),
            step("b", StepKind::Sync).with_key("k"),
        ])
        .unwrap_err();
        assert_eq!(err, PlanError::DuplicateKey("k".to_string()));
    }

    #[test]
    fn dependency_must_come_first() {
        let err = DeploymentPlan::new(vec![
            step("up", StepKind::ContainerUp).after("network"),
            step("network", StepKind::ContainerUp),
        ])
        .unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency { .. }));

        let plan = DeploymentPlan::new(vec![
            step("network", StepKind::Provision),
            step("up", StepKind::ContainerUp).after("network"),
        ])
        .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.step("up").unwrap().after, vec!["network".to_string()]);
    }

    #[test]
    fn self_dependency_is_rejected() {
        let err = DeploymentPlan::new(vec![step("a", StepKind::Sync).after("a")]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency { .. }));
    }

    #[test]
    fn phases_cannot_go_backwards() {
        let err = DeploymentPlan::new(vec![
            step("health", StepKind::HealthCheck),
            step("up", StepKind::ContainerUp),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::PhaseRegression {
                step: "up".to_string(),
                kind: StepKind::ContainerUp,
                previous: StepKind::HealthCheck,
            }
        );
    }

    fn kind_strategy() -> impl Strategy<Value = StepKind> {
        prop_oneof![
            Just(StepKind::Preflight),
            Just(StepKind::Provision),
            Just(StepKind::Sync),
            Just(StepKind::ConfigCheck),
            Just(StepKind::ContainerUp),
            Just(StepKind::HealthCheck),
            Just(StepKind::CertReconcile),
            Just(StepKind::Cleanup),
        ]
    }

    proptest! {
        #[test]
        fn accepted_plans_are_phase_ordered(kinds in prop::collection::vec(kind_strategy(), 1..12)) {
            let steps: Vec<Step> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| step(&format!("s{i}"), *kind))
                .collect();

            let sorted = kinds.windows(2).all(|w| w[0] <= w[1]);
            match DeploymentPlan::new(steps) {
                Ok(plan) => {
                    prop_assert!(sorted);
                    let phases: Vec<u8> = plan.steps().iter().map(|s| s.kind.phase()).collect();
                    prop_assert!(phases.windows(2).all(|w| w[0] <= w[1]));
                }
                Err(PlanError::PhaseRegression { .. }) => prop_assert!(!sorted),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
