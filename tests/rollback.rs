// ABOUTME: Integration tests for the rollback controller.
// ABOUTME: Target resolution, confirmation, per-component independence, and missing references.

mod support;

use deckhand::deploy::{
    AssumeYes, Confirm, DeployError, RevisionHistory, RollbackController, RollbackMode,
    RollbackPlan, RollbackTarget,
};
use deckhand::diagnostics::{Diagnostics, WarningKind};
use deckhand::error::ExitStatus;
use deckhand::plan::{RunStatus, StepStatus};
use deckhand::tools::ContainerStatus;
use deckhand::types::{CommitRef, ComponentName, Revision};
use std::cell::Cell;
use support::{BACKEND_REPO, FRONTEND_REPO, Fixture};

const BACKEND_OLD: &str = "aaaaaaaaaaaa1111";
const BACKEND_NEW: &str = "aaaaaaaaaaaa2222";
const FRONTEND_OLD: &str = "ffffffffffff1111";
const FRONTEND_NEW: &str = "ffffffffffff2222";

fn commit(value: &str) -> CommitRef {
    CommitRef::new(value).unwrap()
}

fn component(name: &str) -> ComponentName {
    ComponentName::new(name).unwrap()
}

/// Both components deployed twice; the stack is running the newer commits.
fn deployed_twice(fx: &Fixture) -> RevisionHistory {
    fx.host.publish(BACKEND_REPO, BACKEND_NEW);
    fx.host.publish(FRONTEND_REPO, FRONTEND_NEW);
    {
        let mut state = fx.host.state();
        state.heads.insert(fx.component_dir("backend"), BACKEND_NEW.to_string());
        state.heads.insert(fx.component_dir("frontend"), FRONTEND_NEW.to_string());
        state.containers = ["backend", "frontend", "nginx"]
            .into_iter()
            .map(|service| ContainerStatus {
                name: format!("shop-{service}-1"),
                service: service.to_string(),
                state: "running".to_string(),
            })
            .collect();
    }

    let mut history = RevisionHistory::load(fx.config.history_path()).unwrap();
    history.record(&component("backend"), &commit(BACKEND_OLD));
    history.record(&component("backend"), &commit(BACKEND_NEW));
    history.record(&component("frontend"), &commit(FRONTEND_OLD));
    history.record(&component("frontend"), &commit(FRONTEND_NEW));
    history
}

struct Answer {
    yes: bool,
    asked: Cell<usize>,
    targets: Cell<usize>,
}

impl Answer {
    fn new(yes: bool) -> Self {
        Self {
            yes,
            asked: Cell::new(0),
            targets: Cell::new(0),
        }
    }
}

impl Confirm for Answer {
    fn confirm(&self, plan: &RollbackPlan) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.targets.set(plan.targets.len());
        self.yes
    }
}

#[tokio::test]
async fn previous_restores_every_component() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    let tools = fx.host.toolbox();
    let compose = fx.config.default_compose_spec();
    let mut diag = Diagnostics::default();

    let report = RollbackController::new(&fx.config, &tools, compose, 3, &mut history)
        .rollback(&RollbackTarget::Previous, RollbackMode::Interactive(&AssumeYes), &mut diag)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::RolledBack);
    assert_eq!(report.exit_status(), ExitStatus::Success);
    assert_eq!(report.revisions.len(), 2);
    assert_eq!(report.containers.len(), 3);
    assert_eq!(
        report.outcome("rebuild").unwrap().status,
        StepStatus::Applied
    );

    assert_eq!(fx.host.head(&fx.component_dir("backend")).as_deref(), Some(BACKEND_OLD));
    assert_eq!(fx.host.head(&fx.component_dir("frontend")).as_deref(), Some(FRONTEND_OLD));
    assert_eq!(history.active(&component("backend")).unwrap().as_str(), BACKEND_OLD);
    assert_eq!(fx.host.state().down_calls, 1);
}

#[tokio::test]
async fn missing_previous_revision_is_a_warning_not_a_failure() {
    let fx = Fixture::new();
    deployed_twice(&fx);
    // frontend only ever had one revision
    let mut history = RevisionHistory::load(fx.dir.path().join("single.json")).unwrap();
    history.record(&component("backend"), &commit(BACKEND_OLD));
    history.record(&component("backend"), &commit(BACKEND_NEW));
    history.record(&component("frontend"), &commit(FRONTEND_NEW));

    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();
    let report = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&RollbackTarget::Previous, RollbackMode::Automatic, &mut diag)
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::RolledBack);
    assert!(report.outcome("checkout-frontend").is_none());
    assert_eq!(fx.host.head(&fx.component_dir("frontend")).as_deref(), Some(FRONTEND_NEW));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::MissingRevision);
}

#[tokio::test]
async fn nothing_to_roll_back_without_history() {
    let fx = Fixture::new();
    let mut history = RevisionHistory::load(fx.config.history_path()).unwrap();
    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();

    let err = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&RollbackTarget::Previous, RollbackMode::Automatic, &mut diag)
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::NothingToRollBack));
    assert_eq!(diag.warnings().len(), 2);
    assert_eq!(fx.host.state().down_calls, 0);
}

#[tokio::test]
async fn declined_confirmation_changes_nothing() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    let tools = fx.host.toolbox();
    let answer = Answer::new(false);
    let mut diag = Diagnostics::default();

    let err = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&RollbackTarget::Previous, RollbackMode::Interactive(&answer), &mut diag)
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::RollbackDeclined));
    assert_eq!(answer.asked.get(), 1);
    assert_eq!(answer.targets.get(), 2);

    let state = fx.host.state();
    assert_eq!(state.down_calls, 0);
    assert!(state.checkouts.is_empty());
    drop(state);
    assert_eq!(history.active(&component("backend")).unwrap().as_str(), BACKEND_NEW);
}

#[tokio::test]
async fn automatic_mode_never_asks() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();

    let report = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&RollbackTarget::Previous, RollbackMode::Automatic, &mut diag)
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::RolledBack);
}

#[tokio::test]
async fn single_component_revision_leaves_the_others_alone() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();
    let target = RollbackTarget::Revision(Revision::new(component("backend"), commit(BACKEND_OLD)));

    let report = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&target, RollbackMode::Interactive(&AssumeYes), &mut diag)
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::RolledBack);
    assert_eq!(fx.host.head(&fx.component_dir("backend")).as_deref(), Some(BACKEND_OLD));
    assert_eq!(fx.host.head(&fx.component_dir("frontend")).as_deref(), Some(FRONTEND_NEW));
    assert!(report.outcome("checkout-frontend").is_none());
}

#[tokio::test]
async fn unknown_component_is_rejected() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();
    let target = RollbackTarget::Revision(Revision::new(component("billing"), commit(BACKEND_OLD)));

    let err = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&target, RollbackMode::Automatic, &mut diag)
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::UnknownComponent(ref name) if name == "billing"));
}

#[tokio::test]
async fn failed_checkout_is_a_partial_rollback() {
    let fx = Fixture::new();
    let mut history = deployed_twice(&fx);
    // the old backend commit is gone from the repository
    fx.host.state().known_commits.remove(BACKEND_OLD);
    let tools = fx.host.toolbox();
    let mut diag = Diagnostics::default();

    let report = RollbackController::new(
        &fx.config,
        &tools,
        fx.config.default_compose_spec(),
        3,
        &mut history,
    )
    .rollback(&RollbackTarget::Previous, RollbackMode::Automatic, &mut diag)
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.exit_status(), ExitStatus::RollbackFailed);
    assert!(report.outcome("checkout-backend").unwrap().status.is_failed());
    // frontend is independent and still restored
    assert_eq!(fx.host.head(&fx.component_dir("frontend")).as_deref(), Some(FRONTEND_OLD));
}
