// ABOUTME: Run report assembled during a run and persisted to an append-only log.
// ABOUTME: The log is JSON lines; `deckhand status` reads the most recent entry.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::{DeployError, DeployErrorKind};
use crate::diagnostics::Warning;
use crate::error::{ExitStatus, Result};
use crate::tools::ContainerStatus;
use crate::types::Revision;

use super::{StepOutcome, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    RolledBack,
}

/// Why a run stopped, with what the operator should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub step: String,
    pub kind: DeployErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub remediation: String,
}

impl FailureSummary {
    pub fn from_error(step: impl Into<String>, error: &DeployError) -> Self {
        Self {
            step: step.into(),
            kind: error.kind(),
            message: error.to_string(),
            diagnostic: error.diagnostic(),
            remediation: error.remediation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<StepOutcome>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    /// Report of the automatic rollback triggered by this run's failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<RunReport>>,
    /// Revisions made active by this run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<Revision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    /// Last log lines per container, captured when the run failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub container_logs: BTreeMap<String, Vec<String>>,
}

impl RunReport {
    pub fn new(command: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), std::process::id()),
            command: command.into(),
            profile: None,
            started_at,
            finished_at: None,
            outcomes: Vec::new(),
            status: RunStatus::Success,
            failure: None,
            rollback: None,
            revisions: Vec::new(),
            containers: Vec::new(),
            warnings: Vec::new(),
            container_logs: BTreeMap::new(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn fail(&mut self, summary: FailureSummary) {
        self.failure = Some(summary);
    }

    pub fn finalize(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| *s == StepStatus::Applied)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::is_failed)
    }

    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    /// Process exit status for this report.
    pub fn exit_status(&self) -> ExitStatus {
        let Some(failure) = &self.failure else {
            return ExitStatus::Success;
        };

        match failure.kind {
            DeployErrorKind::PreflightMissing => ExitStatus::PreflightFailed,
            DeployErrorKind::ConcurrentRun => ExitStatus::Busy,
            DeployErrorKind::RollbackFailed => ExitStatus::RollbackFailed,
            DeployErrorKind::RollbackDeclined
            | DeployErrorKind::NothingToRollBack
            | DeployErrorKind::UnknownComponent => ExitStatus::Error,
            _ => match &self.rollback {
                Some(rollback) if rollback.status == RunStatus::RolledBack => {
                    ExitStatus::RolledBack
                }
                Some(_) => ExitStatus::RollbackFailed,
                None => ExitStatus::DeployFailed,
            },
        }
    }
}

/// Append-only JSON-lines log of run reports.
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one report as a single line.
    pub fn append(&self, report: &RunReport) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(report)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // one write per entry keeps concurrent appends from interleaving
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Most recent report, if any run was logged.
    pub fn last(&self) -> Result<Option<RunReport>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match content.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StepKind;

    fn failure(kind: DeployErrorKind) -> FailureSummary {
        FailureSummary {
            step: "health".to_string(),
            kind,
            message: "boom".to_string(),
            diagnostic: None,
            remediation: "fix it".to_string(),
        }
    }

    #[test]
    fn successful_run_exits_zero() {
        let mut report = RunReport::new("deploy");
        report.record(StepOutcome::named("sync", StepKind::Sync, StepStatus::Applied));
        report.finalize(RunStatus::Success);
        assert_eq!(report.exit_status(), ExitStatus::Success);
        assert_eq!(report.applied(), 1);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn exit_status_reflects_rollback_result() {
        let mut report = RunReport::new("deploy");
        report.fail(failure(DeployErrorKind::HealthCheckTimeout));
        assert_eq!(report.exit_status(), ExitStatus::DeployFailed);

        let mut rollback = RunReport::new("rollback");
        rollback.finalize(RunStatus::RolledBack);
        report.rollback = Some(Box::new(rollback.clone()));
        assert_eq!(report.exit_status(), ExitStatus::RolledBack);

        rollback.finalize(RunStatus::PartialFailure);
        report.rollback = Some(Box::new(rollback));
        assert_eq!(report.exit_status(), ExitStatus::RollbackFailed);
    }

    #[test]
    fn preflight_failure_has_its_own_exit() {
        let mut report = RunReport::new("deploy");
        report.fail(failure(DeployErrorKind::PreflightMissing));
        assert_eq!(report.exit_status(), ExitStatus::PreflightFailed);
    }

    #[test]
    fn log_appends_and_reads_last() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReportLog::new(dir.path().join("state/runs.jsonl"));
        assert!(log.last().unwrap().is_none());

        let mut first = RunReport::new("provision");
        first.finalize(RunStatus::Success);
        log.append(&first).unwrap();

        let mut second = RunReport::new("deploy").with_profile("production");
        second.fail(failure(DeployErrorKind::ActionFailed));
        second.finalize(RunStatus::PartialFailure);
        log.append(&second).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);

        let last = log.last().unwrap().unwrap();
        assert_eq!(last, second);
    }
}
