// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects warnings that shouldn't fail a run but should land in the run report.

use serde::{Deserialize, Serialize};

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Hand the collected warnings over, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn lock_broken(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockBroken, message)
    }

    pub fn missing_revision(message: impl Into<String>) -> Self {
        Self::new(WarningKind::MissingRevision, message)
    }

    pub fn log_capture(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LogCapture, message)
    }

    pub fn proxy_restart(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ProxyRestart, message)
    }

    pub fn state_write(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StateWrite, message)
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Failed to release the run lock (lock file may remain).
    LockRelease,
    /// A stale or forced lock was broken.
    LockBroken,
    /// A component had no revision to roll back to and was skipped.
    MissingRevision,
    /// Container logs could not be captured for the report.
    LogCapture,
    /// Proxy could not be restarted or reloaded after a certificate change.
    ProxyRestart,
    /// Revision history or run log could not be written.
    StateWrite,
}
