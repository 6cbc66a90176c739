// ABOUTME: Rollback controller restoring components to earlier recorded revisions.
// ABOUTME: Stops containers, checks out each component independently, and rebuilds.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::plan::{Action, FailureSummary, RunReport, RunStatus, Step, StepKind, StepStatus};
use crate::runner::{ActionRunner, RunContext};
use crate::tools::{ComposeSpec, Toolbox};
use crate::types::{CommitRef, ComponentName, Revision};

use super::{DeployError, RevisionHistory};

/// What to roll back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Each component's revision recorded before the active one.
    Previous,
    /// One reference resolved in every component.
    Reference(CommitRef),
    /// A single component at a specific commit.
    Revision(Revision),
    /// The listed components back to the commits they ran before this run.
    Snapshot(BTreeMap<ComponentName, CommitRef>),
}

/// A component the rollback will check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub component: ComponentName,
    pub dest: PathBuf,
    pub commit: CommitRef,
    pub current: Option<CommitRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackPlan {
    pub targets: Vec<ResolvedTarget>,
    /// Components without a usable reference.
    pub skipped: Vec<ComponentName>,
}

/// Operator confirmation before anything is mutated.
pub trait Confirm {
    fn confirm(&self, plan: &RollbackPlan) -> bool;
}

/// Always proceeds (`--yes`).
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _plan: &RollbackPlan) -> bool {
        true
    }
}

/// Prints the targets to stderr and reads `y`/`yes` from stdin.
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, plan: &RollbackPlan) -> bool {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "Rollback targets:");
        for target in &plan.targets {
            let current = target
                .current
                .as_ref()
                .map_or("unknown", |c| c.short());
            let _ = writeln!(
                stderr,
                "  {}: {} -> {}",
                target.component,
                current,
                target.commit.short()
            );
        }
        for component in &plan.skipped {
            let _ = writeln!(stderr, "  {component}: no reference, left as is");
        }
        let _ = write!(stderr, "Proceed? [y/N] ");
        let _ = stderr.flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub enum RollbackMode<'a> {
    /// Orchestrator failure path; no operator may be present.
    Automatic,
    Interactive(&'a dyn Confirm),
}

pub struct RollbackController<'a> {
    config: &'a Config,
    tools: &'a Toolbox,
    compose: ComposeSpec,
    expected: usize,
    history: &'a mut RevisionHistory,
}

impl<'a> RollbackController<'a> {
    /// `compose` is rebuilt from source after checkout.
    pub fn new(
        config: &'a Config,
        tools: &'a Toolbox,
        compose: ComposeSpec,
        expected: usize,
        history: &'a mut RevisionHistory,
    ) -> Self {
        let compose = ComposeSpec {
            build: true,
            ..compose
        };
        Self {
            config,
            tools,
            compose,
            expected,
            history,
        }
    }

    /// Resolve `target` to a commit per component. Missing references are warnings.
    pub async fn resolve(
        &self,
        target: &RollbackTarget,
        diag: &mut Diagnostics,
    ) -> Result<RollbackPlan, DeployError> {
        let mut plan = RollbackPlan::default();

        let components: Vec<_> = match target {
            RollbackTarget::Revision(revision) => {
                let component = self
                    .config
                    .component(&revision.component)
                    .ok_or_else(|| DeployError::UnknownComponent(revision.component.to_string()))?;
                vec![component]
            }
            RollbackTarget::Snapshot(commits) => self
                .config
                .components
                .iter()
                .filter(|c| commits.contains_key(&c.name))
                .collect(),
            _ => self.config.components.iter().collect(),
        };

        for component in components {
            let dest = self.config.component_dir(component);
            let commit = match target {
                RollbackTarget::Previous => {
                    self.history.previous(&component.name).map(|r| r.commit.clone())
                }
                RollbackTarget::Reference(reference) => {
                    self.resolve_in(&dest, reference, diag).await
                }
                RollbackTarget::Revision(revision) => {
                    self.resolve_in(&dest, &revision.commit, diag).await
                }
                RollbackTarget::Snapshot(commits) => commits.get(&component.name).cloned(),
            };

            match commit {
                Some(commit) => {
                    let current = self.tools.vcs.head(&dest).await.ok().flatten();
                    plan.targets.push(ResolvedTarget {
                        component: component.name.clone(),
                        dest,
                        commit,
                        current,
                    });
                }
                None => {
                    diag.warn(Warning::missing_revision(format!(
                        "{}: no revision to roll back to, left unchanged",
                        component.name
                    )));
                    plan.skipped.push(component.name.clone());
                }
            }
        }

        if plan.targets.is_empty() {
            return Err(DeployError::NothingToRollBack);
        }
        Ok(plan)
    }

    async fn resolve_in(
        &self,
        dest: &std::path::Path,
        reference: &CommitRef,
        diag: &mut Diagnostics,
    ) -> Option<CommitRef> {
        match self.tools.vcs.resolve(dest, reference).await {
            Ok(found) => found,
            Err(e) => {
                diag.warn(Warning::missing_revision(format!(
                    "could not resolve {reference} in {}: {e}",
                    dest.display()
                )));
                None
            }
        }
    }

    /// Resolve, confirm, and apply. Only resolution and confirmation errors are
    /// returned as `Err`; failures while mutating land in the report, together
    /// with the warnings collected so far.
    pub async fn rollback(
        &mut self,
        target: &RollbackTarget,
        mode: RollbackMode<'_>,
        diag: &mut Diagnostics,
    ) -> Result<RunReport, DeployError> {
        let plan = self.resolve(target, diag).await?;

        if let RollbackMode::Interactive(confirm) = mode
            && !confirm.confirm(&plan)
        {
            return Err(DeployError::RollbackDeclined);
        }

        let mut report = self.apply(&plan, diag).await;
        report.warnings.extend(diag.take());
        Ok(report)
    }

    async fn apply(&mut self, plan: &RollbackPlan, diag: &mut Diagnostics) -> RunReport {
        let runner = ActionRunner::new(self.tools.clone());
        let mut report = RunReport::new("rollback");
        let mut first_failure: Option<(String, String)> = None;

        let stop = Step::new(
            "stop-containers",
            StepKind::ContainerUp,
            Action::ContainersDown {
                compose: self.compose.clone(),
            },
        );
        let outcome = runner.apply(&stop, &RunContext::default()).await;
        if let StepStatus::Failed(reason) = &outcome.status {
            first_failure.get_or_insert((stop.name.clone(), reason.clone()));
        }
        report.record(outcome);

        for target in &plan.targets {
            info!(component = %target.component, commit = %target.commit, "rolling back");
            let step = Step::new(
                format!("checkout-{}", target.component),
                StepKind::Sync,
                Action::CheckoutRevision {
                    component: target.component.clone(),
                    dest: target.dest.clone(),
                    reference: target.commit.clone(),
                },
            );
            let outcome = runner.apply(&step, &RunContext::default()).await;
            match &outcome.status {
                StepStatus::Failed(reason) => {
                    first_failure.get_or_insert((step.name.clone(), reason.clone()));
                }
                _ => {
                    self.history.activate(&target.component, &target.commit);
                    report
                        .revisions
                        .push(Revision::new(target.component.clone(), target.commit.clone()));
                }
            }
            report.record(outcome);
        }

        let rebuild = Step::new(
            "rebuild",
            StepKind::ContainerUp,
            Action::ContainersUp {
                compose: self.compose.clone(),
                expected: self.expected,
            },
        );
        // checked-out code always needs a rebuild
        let ctx = RunContext { code_changed: true };
        let outcome = runner.apply(&rebuild, &ctx).await;
        if let StepStatus::Failed(reason) = &outcome.status {
            first_failure.get_or_insert((rebuild.name.clone(), reason.clone()));
        }
        report.record(outcome);

        match self.tools.runtime.ps(&self.compose).await {
            Ok(containers) => report.containers = containers,
            Err(e) => diag.warn(Warning::log_capture(format!(
                "could not list containers after rollback: {e}"
            ))),
        }

        match first_failure {
            None => report.finalize(RunStatus::RolledBack),
            Some((step, reason)) => {
                let error = DeployError::RollbackFailed(format!("{step}: {reason}"));
                report.fail(FailureSummary::from_error(step, &error));
                report.finalize(RunStatus::PartialFailure);
            }
        }
        report
    }
}
