// ABOUTME: Error types for orchestrated runs.
// ABOUTME: Every variant carries a kind, an optional diagnostic, and a remediation hint.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preflight::{Capability, describe_missing};

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("preflight failed: {} missing", missing.len())]
    PreflightMissing { missing: Vec<Capability> },

    #[error("step '{step}' failed: {reason}")]
    ActionFailed {
        step: String,
        reason: String,
        detail: Option<String>,
    },

    #[error("health check timed out after {}s: {running} of {expected} containers running", timeout.as_secs())]
    HealthCheckTimeout {
        expected: usize,
        running: usize,
        timeout: Duration,
    },

    #[error("certificate for {domain}: {reason}")]
    CertificateError { domain: String, reason: String },

    #[error("another run is in progress (held by {holder}, pid {pid}, since {started_at})")]
    ConcurrentRunInProgress {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
        lock_path: PathBuf,
    },

    #[error("disk usage {usage}% exceeds the {threshold}% threshold after cleanup")]
    InsufficientDiskSpace { usage: u8, threshold: u8 },

    #[error("run aborted by operator before step '{step}'")]
    Aborted { step: String },

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("no earlier revision to roll back to")]
    NothingToRollBack,

    #[error("rollback declined by operator")]
    RollbackDeclined,

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("run lock error: {0}")]
    Lock(String),

    #[error("state file error: {0}")]
    StateFile(String),
}

/// Error kind for programmatic handling and for the persisted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployErrorKind {
    PreflightMissing,
    ActionFailed,
    HealthCheckTimeout,
    Certificate,
    ConcurrentRun,
    InsufficientDiskSpace,
    Aborted,
    RollbackFailed,
    NothingToRollBack,
    RollbackDeclined,
    UnknownComponent,
    Lock,
    StateFile,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::PreflightMissing { .. } => DeployErrorKind::PreflightMissing,
            DeployError::ActionFailed { .. } => DeployErrorKind::ActionFailed,
            DeployError::HealthCheckTimeout { .. } => DeployErrorKind::HealthCheckTimeout,
            DeployError::CertificateError { .. } => DeployErrorKind::Certificate,
            DeployError::ConcurrentRunInProgress { .. } => DeployErrorKind::ConcurrentRun,
            DeployError::InsufficientDiskSpace { .. } => DeployErrorKind::InsufficientDiskSpace,
            DeployError::Aborted { .. } => DeployErrorKind::Aborted,
            DeployError::RollbackFailed(_) => DeployErrorKind::RollbackFailed,
            DeployError::NothingToRollBack => DeployErrorKind::NothingToRollBack,
            DeployError::RollbackDeclined => DeployErrorKind::RollbackDeclined,
            DeployError::UnknownComponent(_) => DeployErrorKind::UnknownComponent,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::StateFile(_) => DeployErrorKind::StateFile,
        }
    }

    /// Captured diagnostic: missing capabilities, or exit code and stderr tail.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            DeployError::PreflightMissing { missing } => Some(describe_missing(missing)),
            DeployError::ActionFailed { detail, .. } => detail.clone(),
            DeployError::ConcurrentRunInProgress { lock_path, .. } => {
                Some(format!("lock file: {}", lock_path.display()))
            }
            _ => None,
        }
    }

    /// The external command or action an operator should take next.
    pub fn remediation(&self) -> String {
        match self {
            DeployError::PreflightMissing { .. } => {
                "install what is missing and re-run; `deckhand provision` prepares a fresh host"
                    .to_string()
            }
            DeployError::ActionFailed { .. } => {
                "fix the cause shown in the diagnostic and re-run; completed steps are skipped"
                    .to_string()
            }
            DeployError::HealthCheckTimeout { .. } => {
                "inspect the containers with `docker compose ps` and `docker compose logs --tail 50`"
                    .to_string()
            }
            DeployError::CertificateError { domain, .. } => format!(
                "check that DNS for {domain} points at this host and port 80 is reachable, \
                 then run `deckhand ssl-setup {domain} <email>`"
            ),
            DeployError::ConcurrentRunInProgress { .. } => {
                "wait for the other run to finish, or pass --force if it is no longer running"
                    .to_string()
            }
            DeployError::InsufficientDiskSpace { .. } => {
                "free disk space (`df -h`, `docker system prune -a`) or grow the volume".to_string()
            }
            DeployError::Aborted { .. } => {
                "re-run when ready; completed steps are skipped".to_string()
            }
            DeployError::RollbackFailed(_) => {
                "check out a known-good revision with `git checkout <ref>` in each component \
                 and run `docker compose up -d --build`"
                    .to_string()
            }
            DeployError::NothingToRollBack => {
                "pass an explicit reference with `deckhand rollback --to <ref>`".to_string()
            }
            DeployError::RollbackDeclined => "nothing was changed".to_string(),
            DeployError::UnknownComponent(_) => {
                "use a component name listed in deckhand.yml".to_string()
            }
            DeployError::Lock(_) | DeployError::StateFile(_) => {
                "check ownership and permissions of the state directory".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_diagnostic_lists_every_capability() {
        let err = DeployError::PreflightMissing {
            missing: vec![Capability::binary("docker"), Capability::binary("git")],
        };
        assert_eq!(err.kind(), DeployErrorKind::PreflightMissing);
        let diagnostic = err.diagnostic().unwrap();
        assert!(diagnostic.contains("docker"));
        assert!(diagnostic.contains("git"));
    }

    #[test]
    fn action_failure_carries_detail() {
        let err = DeployError::ActionFailed {
            step: "sync-backend".to_string(),
            reason: "end state not reached".to_string(),
            detail: Some("`git pull` exited with code 1: fatal: no remote".to_string()),
        };
        assert!(err.to_string().contains("sync-backend"));
        assert!(err.diagnostic().unwrap().contains("code 1"));
        assert!(!err.remediation().is_empty());
    }

    #[test]
    fn certificate_remediation_names_domain() {
        let err = DeployError::CertificateError {
            domain: "shop.example.com".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(err.remediation().contains("ssl-setup shop.example.com"));
    }
}
