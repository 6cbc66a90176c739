// ABOUTME: Read-only probes of the local host used by preflight and the disk guard.
// ABOUTME: Binary lookup on PATH, file existence, privilege, and disk usage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::{ParseSnafu, ToolError};
use super::process::ProcessRunner;

#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn binary_on_path(&self, name: &str) -> bool;

    async fn file_exists(&self, path: &Path) -> bool;

    async fn is_root(&self) -> bool;

    /// Used capacity of the filesystem holding `path`, in percent.
    async fn disk_usage_percent(&self, path: &Path) -> Result<u8, ToolError>;
}

/// Probes the machine deckhand runs on.
#[derive(Debug, Clone)]
pub struct LocalHost {
    runner: ProcessRunner,
}

impl LocalHost {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl HostProbe for LocalHost {
    async fn binary_on_path(&self, name: &str) -> bool {
        find_on_path(name, std::env::var_os("PATH").as_deref()).is_some()
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_root(&self) -> bool {
        match self.runner.run("id", &["-u"]).await {
            Ok(uid) => uid.trim() == "0",
            Err(e) => {
                tracing::debug!("could not determine uid: {}", e);
                false
            }
        }
    }

    async fn disk_usage_percent(&self, path: &Path) -> Result<u8, ToolError> {
        let path = path.display().to_string();
        let stdout = self.runner.run("df", &["-P", &path]).await?;
        parse_df_usage(&stdout)
    }
}

/// Locate an executable named `name` in a PATH-style list.
pub fn find_on_path(name: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path_var = path_var?;
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| {
            candidate
                .metadata()
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
}

/// Extract the capacity column from `df -P` output.
pub fn parse_df_usage(stdout: &str) -> Result<u8, ToolError> {
    let parse_error = |message: String| {
        ParseSnafu {
            command: "df -P",
            message,
        }
        .build()
    };

    let line = stdout
        .lines()
        .nth(1)
        .ok_or_else(|| parse_error("missing data line".to_string()))?;
    let capacity = line
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| parse_error(format!("missing capacity column: {line}")))?;
    capacity
        .trim_end_matches('%')
        .parse::<u8>()
        .map_err(|e| parse_error(format!("{e}: {capacity}")))
}
