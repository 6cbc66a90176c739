// ABOUTME: Deployment orchestrator driving a plan through the run state machine.
// ABOUTME: Owns the run lock, the failure path, automatic rollback, and report persistence.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::certs::{CertAction, CertificateManager};
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::plan::{
    Action, CertTarget, DeploymentPlan, FailureSummary, ReportLog, RunReport, RunStatus, Step,
    StepKind, StepOutcome, StepStatus,
};
use crate::preflight::{self, PreflightReport};
use crate::runner::{ActionRunner, RunContext};
use crate::tools::{ComposeSpec, Toolbox};
use crate::types::{CommitRef, ComponentName, Revision};

use super::disk::DiskGuard;
use super::health::wait_for_containers;
use super::rollback::{RollbackController, RollbackMode, RollbackTarget};
use super::{AbortHandle, DeployError, RevisionHistory, RunLock, RunState};

/// Name of the outcome recorded for the disk-pressure cleanup pass.
pub const DISK_CLEANUP_STEP: &str = "disk-cleanup";

/// A fatal error and where it happened.
struct Failure {
    step: String,
    kind: StepKind,
    error: DeployError,
}

pub struct Orchestrator<'a> {
    config: &'a Config,
    tools: Toolbox,
    runner: ActionRunner,
    abort: AbortHandle,
    force: bool,
    rollback_on_failure: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, tools: Toolbox) -> Self {
        Self {
            config,
            runner: ActionRunner::new(tools.clone()),
            tools,
            abort: AbortHandle::new(),
            force: false,
            rollback_on_failure: config.rollback_on_failure,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Break a held run lock.
    pub fn force_lock(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled && self.config.rollback_on_failure;
        self
    }

    /// Run `plan` under the run lock.
    ///
    /// Returns `Err` only when the run never started (lock held, state
    /// unreadable). Every failure after that is in the returned report, which
    /// has also been appended to the run log.
    pub async fn run(
        &self,
        command: &str,
        profile: Option<&str>,
        plan: &DeploymentPlan,
    ) -> Result<RunReport, DeployError> {
        let mut diag = Diagnostics::default();
        let state_dir = self.config.state_dir();
        let lock = RunLock::acquire(&state_dir, &self.config.project, command, self.force, &mut diag)?;
        let mut history = RevisionHistory::load(self.config.history_path())?;

        let mut report = RunReport::new(command);
        if let Some(profile) = profile {
            report = report.with_profile(profile);
        }

        // what was running before this run touched anything
        let started_on: BTreeMap<ComponentName, Option<CommitRef>> = self
            .config
            .components
            .iter()
            .map(|c| (c.name.clone(), history.active(&c.name).cloned()))
            .collect();

        let mut state = RunState::Idle;
        let failure = self
            .execute(plan, &mut state, &mut report, &mut history, &mut diag)
            .await;

        let status = match failure {
            None => {
                self.transition(&mut state, RunState::Done);
                if compose_of(plan).is_some() {
                    for component in self.config.components.iter() {
                        history.mark_good(&component.name);
                    }
                }
                RunStatus::Success
            }
            Some(failure) => {
                self.fail(
                    plan,
                    failure,
                    &started_on,
                    &mut state,
                    &mut report,
                    &mut history,
                    &mut diag,
                )
                .await
            }
        };

        if let Err(e) = history.save() {
            diag.warn(Warning::state_write(e.to_string()));
        }
        if let Err(e) = lock.release() {
            diag.warn(Warning::lock_release(e.to_string()));
        }

        report.warnings.extend(diag.take());
        report.finalize(status);

        if let Err(e) = ReportLog::new(self.config.report_log_path()).append(&report) {
            warn!("failed to append run report: {e}");
            report
                .warnings
                .push(Warning::state_write(format!("run log not written: {e}")));
        }

        info!(run = %report.run_id, status = ?report.status, state = %state, "run finished");
        Ok(report)
    }

    fn transition(&self, state: &mut RunState, next: RunState) {
        if *state == next {
            return;
        }
        if state.can_transition_to(next) {
            debug!(from = %state, to = %next, "state transition");
        } else {
            warn!(from = %state, to = %next, "unexpected state transition");
        }
        *state = next;
    }

    /// Walk the plan; stop at the first fatal error.
    async fn execute(
        &self,
        plan: &DeploymentPlan,
        state: &mut RunState,
        report: &mut RunReport,
        history: &mut RevisionHistory,
        diag: &mut Diagnostics,
    ) -> Option<Failure> {
        let mut ctx = RunContext::default();
        let mut disk_checked = false;

        for step in plan.steps() {
            if self.abort.is_aborted() {
                return Some(Failure {
                    step: step.name.clone(),
                    kind: step.kind,
                    error: DeployError::Aborted {
                        step: step.name.clone(),
                    },
                });
            }

            self.transition(state, RunState::for_kind(step.kind));

            if step.kind == StepKind::ContainerUp && !disk_checked {
                disk_checked = true;
                if let Err(error) = self.guard_disk(report).await {
                    return Some(Failure {
                        step: DISK_CLEANUP_STEP.to_string(),
                        kind: StepKind::ContainerUp,
                        error,
                    });
                }
            }

            let outcome = match self.execute_step(step, &ctx, diag).await {
                Ok(outcome) => outcome,
                Err((outcome, error)) => {
                    report.record(outcome);
                    return Some(Failure {
                        step: step.name.clone(),
                        kind: step.kind,
                        error,
                    });
                }
            };

            if let Action::SyncRepository {
                component, dest, ..
            } = &step.action
            {
                if outcome.status == StepStatus::Applied {
                    ctx.code_changed = true;
                }
                match self.tools.vcs.head(dest).await {
                    Ok(Some(head)) => {
                        if history.record(component, &head) {
                            report
                                .revisions
                                .push(Revision::new(component.clone(), head));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => diag.warn(Warning::state_write(format!(
                        "could not record revision of {component}: {e}"
                    ))),
                }
            }

            report.record(outcome);
        }

        None
    }

    /// Dispatch one step. Failed outcomes come back with the matching error.
    async fn execute_step(
        &self,
        step: &Step,
        ctx: &RunContext,
        diag: &mut Diagnostics,
    ) -> Result<StepOutcome, (StepOutcome, DeployError)> {
        match &step.action {
            Action::CheckCapabilities(required) => {
                match preflight::check(self.tools.host.as_ref(), required).await {
                    PreflightReport::AllSatisfied => {
                        Ok(StepOutcome::new(step, StepStatus::Satisfied))
                    }
                    PreflightReport::Missing(missing) => {
                        let outcome = StepOutcome::new(
                            step,
                            StepStatus::Failed(format!("{} capabilities missing", missing.len())),
                        )
                        .with_detail(preflight::describe_missing(&missing));
                        Err((outcome, DeployError::PreflightMissing { missing }))
                    }
                }
            }
            Action::WaitHealthy {
                compose,
                expected,
                timeout,
                interval,
            } => {
                match wait_for_containers(
                    self.tools.runtime.as_ref(),
                    compose,
                    *expected,
                    *timeout,
                    *interval,
                )
                .await
                {
                    Ok(_) => Ok(StepOutcome::new(step, StepStatus::Satisfied)),
                    Err(error) => {
                        let outcome = StepOutcome::new(step, StepStatus::Failed(error.to_string()));
                        Err((outcome, error))
                    }
                }
            }
            Action::ReconcileCertificate { target: None } => Ok(StepOutcome::new(
                step,
                StepStatus::Skipped,
            )
            .with_detail("no certificate domain configured")),
            Action::ReconcileCertificate {
                target: Some(target),
            } => self.reconcile_certificate(step, target, diag).await,
            _ => {
                let outcome = self.runner.apply(step, ctx).await;
                match &outcome.status {
                    StepStatus::Failed(reason) => {
                        let error = DeployError::ActionFailed {
                            step: step.name.clone(),
                            reason: reason.clone(),
                            detail: outcome.detail.clone(),
                        };
                        Err((outcome, error))
                    }
                    _ => Ok(outcome),
                }
            }
        }
    }

    async fn reconcile_certificate(
        &self,
        step: &Step,
        target: &CertTarget,
        diag: &mut Diagnostics,
    ) -> Result<StepOutcome, (StepOutcome, DeployError)> {
        let manager = CertificateManager::new(
            self.tools.authority.clone(),
            self.tools.proxy.clone(),
            &self.config.tls,
        );
        let action = manager.reconcile(target, diag).await;
        info!(domain = %target.domain, "{action}");

        match action {
            CertAction::NoneNeeded => Ok(StepOutcome::new(step, StepStatus::Satisfied)),
            CertAction::Issued | CertAction::Renewed => {
                Ok(StepOutcome::new(step, StepStatus::Applied).with_detail(action.to_string()))
            }
            CertAction::Failed(reason) => {
                let outcome = StepOutcome::new(step, StepStatus::Failed(reason.clone()));
                let error = DeployError::CertificateError {
                    domain: target.domain.clone(),
                    reason,
                };
                Err((outcome, error))
            }
        }
    }

    /// Measure disk usage; prune once and re-measure when over the threshold.
    async fn guard_disk(&self, report: &mut RunReport) -> Result<(), DeployError> {
        let disk = &self.config.disk;
        let guard = DiskGuard::new(
            self.tools.runtime.as_ref(),
            self.tools.host.as_ref(),
            &disk.path,
            disk.threshold_percent,
        );

        let measured = match guard.check().await {
            Ok(measured) => measured,
            Err(e) => {
                let error = DeployError::ActionFailed {
                    step: DISK_CLEANUP_STEP.to_string(),
                    reason: "could not measure disk usage".to_string(),
                    detail: Some(e.to_string()),
                };
                report.record(
                    StepOutcome::named(
                        DISK_CLEANUP_STEP,
                        StepKind::ContainerUp,
                        StepStatus::Failed(error.to_string()),
                    )
                    .with_detail(e.to_string()),
                );
                return Err(error);
            }
        };

        if measured.cleanup.is_none() {
            return Ok(());
        }

        let summary = measured.summary();
        let result = measured.into_result();
        let status = match &result {
            Ok(()) => StepStatus::Applied,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(
            StepOutcome::named(DISK_CLEANUP_STEP, StepKind::ContainerUp, status).with_detail(summary),
        );
        result
    }

    /// Failing: capture logs, then roll back or compensate, and pick the end state.
    async fn fail(
        &self,
        plan: &DeploymentPlan,
        failure: Failure,
        started_on: &BTreeMap<ComponentName, Option<CommitRef>>,
        state: &mut RunState,
        report: &mut RunReport,
        history: &mut RevisionHistory,
        diag: &mut Diagnostics,
    ) -> RunStatus {
        self.transition(state, RunState::Failing);
        warn!(step = %failure.step, "run failed: {}", failure.error);

        let compose = compose_of(plan);
        if failure.kind > StepKind::Preflight
            && let Some((compose, _)) = &compose
        {
            report.container_logs = self.capture_logs(compose, diag).await;
        }

        report.fail(FailureSummary::from_error(&failure.step, &failure.error));

        let mutated = failure.kind >= StepKind::Sync;
        let disk_refused = matches!(failure.error, DeployError::InsufficientDiskSpace { .. });

        // components this run moved, with the commit each ran before
        let changed: Vec<(&ComponentName, Option<&CommitRef>)> = started_on
            .iter()
            .filter(|(name, before)| history.active(name) != before.as_ref())
            .map(|(name, before)| (name, before.as_ref()))
            .collect();

        if mutated && !disk_refused {
            for (name, _) in &changed {
                if let Some(head) = history.active(name).cloned() {
                    history.mark_failed(name, &head);
                }
            }
        }

        let restore: BTreeMap<ComponentName, CommitRef> = changed
            .iter()
            .filter_map(|(name, before)| Some(((*name).clone(), (*before)?.clone())))
            .collect();

        let eligible = self.rollback_on_failure && mutated && !disk_refused && !restore.is_empty();

        if eligible && let Some((compose, expected)) = compose {
            info!("rolling back to the previous revision");
            let mut rollback_diag = Diagnostics::default();
            for (name, before) in &changed {
                if before.is_none() {
                    rollback_diag.warn(Warning::missing_revision(format!(
                        "{name}: first deployed by this run, left unchanged"
                    )));
                }
            }
            let mut controller =
                RollbackController::new(self.config, &self.tools, compose, expected, history);
            let rollback = match controller
                .rollback(
                    &RollbackTarget::Snapshot(restore),
                    RollbackMode::Automatic,
                    &mut rollback_diag,
                )
                .await
            {
                Ok(rollback) => rollback,
                Err(error) => {
                    let mut rollback = RunReport::new("rollback");
                    rollback.fail(FailureSummary::from_error("resolve", &error));
                    rollback.warnings = rollback_diag.take();
                    rollback.finalize(RunStatus::PartialFailure);
                    rollback
                }
            };

            let status = if rollback.status == RunStatus::RolledBack {
                self.transition(state, RunState::RolledBack);
                RunStatus::RolledBack
            } else {
                self.transition(state, RunState::ReportedFailure);
                RunStatus::PartialFailure
            };
            report.rollback = Some(Box::new(rollback));
            return status;
        }

        if self.rollback_on_failure && mutated && !disk_refused {
            self.compensate(plan, report).await;
        }

        self.transition(state, RunState::ReportedFailure);
        RunStatus::PartialFailure
    }

    /// Undo applied steps that declare a compensating action, newest first.
    async fn compensate(&self, plan: &DeploymentPlan, report: &mut RunReport) {
        let undo: Vec<Step> = report
            .outcomes
            .iter()
            .rev()
            .filter(|o| o.status == StepStatus::Applied)
            .filter_map(|o| plan.step(&o.step))
            .filter_map(|step| {
                let action = step.rollback_action.clone()?;
                Some(Step::new(format!("undo-{}", step.name), step.kind, action))
            })
            .collect();

        for step in undo {
            info!(step = %step.name, "compensating");
            let outcome = self.runner.apply(&step, &RunContext::default()).await;
            report.record(outcome);
        }
    }

    /// Last log lines of every container, fetched concurrently.
    async fn capture_logs(
        &self,
        compose: &ComposeSpec,
        diag: &mut Diagnostics,
    ) -> BTreeMap<String, Vec<String>> {
        let runtime = self.tools.runtime.as_ref();
        let containers = match runtime.ps(compose).await {
            Ok(containers) => containers,
            Err(e) => {
                diag.warn(Warning::log_capture(format!("could not list containers: {e}")));
                return BTreeMap::new();
            }
        };

        let tail = self.config.health.log_lines;
        let services: BTreeSet<String> = containers.into_iter().map(|c| c.service).collect();
        let fetches = services.into_iter().map(|service| async move {
            let result = runtime.logs(compose, &service, tail).await;
            (service, result)
        });

        let mut logs = BTreeMap::new();
        for (service, result) in join_all(fetches).await {
            match result {
                Ok(lines) => {
                    logs.insert(service, lines);
                }
                Err(e) => diag.warn(Warning::log_capture(format!(
                    "could not capture logs of {service}: {e}"
                ))),
            }
        }
        logs
    }
}

/// Compose stack the plan starts, with its expected container count.
fn compose_of(plan: &DeploymentPlan) -> Option<(ComposeSpec, usize)> {
    plan.steps().iter().find_map(|step| match &step.action {
        Action::ContainersUp { compose, expected } => Some((compose.clone(), *expected)),
        _ => None,
    })
}
