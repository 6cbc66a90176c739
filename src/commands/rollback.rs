// ABOUTME: Rollback command implementation.
// ABOUTME: Resolves the target revision, asks for confirmation, and rebuilds under the run lock.

use super::Host;
use deckhand::deploy::{
    AssumeYes, Confirm, RevisionHistory, RollbackController, RollbackMode, RollbackTarget,
    RunLock, TerminalPrompt,
};
use deckhand::diagnostics::{Diagnostics, Warning};
use deckhand::error::{Error, ExitStatus, Result};
use deckhand::output::Output;
use deckhand::plan::ReportLog;
use deckhand::types::{CommitRef, ComponentName, Revision};

pub struct RollbackArgs {
    pub to: Option<String>,
    pub component: Option<String>,
    pub profile: Option<String>,
    pub yes: bool,
    pub force: bool,
}

impl RollbackArgs {
    fn target(&self) -> Result<RollbackTarget> {
        let reference = self
            .to
            .as_deref()
            .map(CommitRef::new)
            .transpose()
            .map_err(|e| Error::InvalidArgument(format!("--to: {e}")))?;

        match (reference, &self.component) {
            (None, _) => Ok(RollbackTarget::Previous),
            (Some(reference), None) => Ok(RollbackTarget::Reference(reference)),
            (Some(reference), Some(component)) => {
                let component = ComponentName::new(component)
                    .map_err(|e| Error::InvalidArgument(format!("--component: {e}")))?;
                Ok(RollbackTarget::Revision(Revision::new(component, reference)))
            }
        }
    }
}

pub async fn rollback(host: &Host, args: RollbackArgs, output: &mut Output) -> Result<ExitStatus> {
    let target = args.target()?;
    let (profile_name, profile) = host.config.profile(args.profile.as_deref())?;
    let compose = host.config.compose_spec(profile);

    output.start_timer();
    let mut diag = Diagnostics::default();
    let lock = RunLock::acquire(
        &host.config.state_dir(),
        &host.config.project,
        "rollback",
        args.force,
        &mut diag,
    )?;
    let mut history = RevisionHistory::load(host.config.history_path())?;

    let confirm: &dyn Confirm = if args.yes { &AssumeYes } else { &TerminalPrompt };
    let result = RollbackController::new(
        &host.config,
        &host.tools,
        compose,
        profile.expected_containers(),
        &mut history,
    )
    .rollback(&target, RollbackMode::Interactive(confirm), &mut diag)
    .await;

    // on Err nothing was touched and dropping the guard removes the lock
    let mut report = result?.with_profile(profile_name);

    if let Err(e) = history.save() {
        report.warnings.push(Warning::state_write(e.to_string()));
    }
    if let Err(e) = lock.release() {
        report.warnings.push(Warning::lock_release(e.to_string()));
    }
    report.warnings.extend(diag.take());

    if let Err(e) = ReportLog::new(host.config.report_log_path()).append(&report) {
        report
            .warnings
            .push(Warning::state_write(format!("run log not written: {e}")));
    }

    output.report(&report);
    Ok(report.exit_status())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(to: Option<&str>, component: Option<&str>) -> RollbackArgs {
        RollbackArgs {
            to: to.map(String::from),
            component: component.map(String::from),
            profile: None,
            yes: true,
            force: false,
        }
    }

    #[test]
    fn no_reference_means_previous() {
        assert_eq!(args(None, None).target().unwrap(), RollbackTarget::Previous);
    }

    #[test]
    fn component_and_reference_target_one_revision() {
        let target = args(Some("v1.2.0"), Some("backend")).target().unwrap();
        match target {
            RollbackTarget::Revision(revision) => {
                assert_eq!(revision.component.as_str(), "backend");
                assert_eq!(revision.commit.as_str(), "v1.2.0");
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn option_like_reference_is_rejected() {
        assert!(matches!(
            args(Some("--force"), None).target(),
            Err(Error::InvalidArgument(_))
        ));
    }
}
