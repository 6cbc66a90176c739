// ABOUTME: Application-wide error types and process exit codes for deckhand.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::plan::PlanError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown deployment profile: {0}")]
    UnknownProfile(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Exit status for an error that ended the command before a report existed.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Error::Deploy(DeployError::ConcurrentRunInProgress { .. }) => ExitStatus::Busy,
            Error::Deploy(DeployError::PreflightMissing { .. }) => ExitStatus::PreflightFailed,
            _ => ExitStatus::Error,
        }
    }
}

/// Process exit codes reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Usage, configuration, or internal error.
    Error,
    /// Preflight found missing capabilities; nothing was changed.
    PreflightFailed,
    /// Deployment failed and no rollback was attempted.
    DeployFailed,
    /// Deployment failed; rollback was attempted and succeeded.
    RolledBack,
    /// Deployment failed; rollback was attempted and failed.
    RollbackFailed,
    /// Another run holds the run lock.
    Busy,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Error => 1,
            ExitStatus::PreflightFailed => 2,
            ExitStatus::DeployFailed => 3,
            ExitStatus::RolledBack => 4,
            ExitStatus::RollbackFailed => 5,
            ExitStatus::Busy => 6,
        }
    }
}
