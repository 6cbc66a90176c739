// ABOUTME: Error types for external tool invocations with the SNAFU pattern.
// ABOUTME: Captures command line, exit code, and a stderr tail for diagnostics.

use snafu::Snafu;
use std::time::Duration;

/// Failure while driving an external program (docker, git, certbot...).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ToolError {
    #[snafu(display("failed to start `{program}`: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` timed out after {}s", timeout.as_secs()))]
    Timeout { command: String, timeout: Duration },

    #[snafu(display("`{command}` exited with {}: {stderr_tail}", exit_code.map_or("signal".to_string(), |c| format!("code {c}"))))]
    Exit {
        command: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[snafu(display("could not parse output of `{command}`: {message}"))]
    Parse { command: String, message: String },

    #[snafu(display("I/O error on {path}: {source}"))]
    File {
        path: String,
        source: std::io::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// The program could not be started (usually not installed).
    NotFound,
    /// The program was started but could not be spawned for another reason.
    SpawnFailed,
    Timeout,
    NonZeroExit,
    Parse,
    Io,
}

impl ToolError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ToolErrorKind::NotFound
            }
            ToolError::Spawn { .. } => ToolErrorKind::SpawnFailed,
            ToolError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolError::Exit { .. } => ToolErrorKind::NonZeroExit,
            ToolError::Parse { .. } => ToolErrorKind::Parse,
            ToolError::File { .. } => ToolErrorKind::Io,
        }
    }

    /// Exit code of the failed command, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ToolError::Exit { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Shorthand for building a failure from an in-process check (used by fakes too).
    pub fn failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Exit {
            command: command.into(),
            exit_code: Some(1),
            stderr_tail: message.into(),
        }
    }
}
