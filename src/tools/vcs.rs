// ABOUTME: Version control collaborator: clone, pull, checkout, and head inspection.
// ABOUTME: Process-backed implementation drives the `git` CLI.

use std::path::Path;

use async_trait::async_trait;

use super::error::{ParseSnafu, ToolError};
use super::process::{ProcessRunner, STDERR_TAIL_LINES, tail_lines};
use crate::types::CommitRef;

/// Result of pulling a branch into a working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Updated,
    UpToDate,
    /// Local history diverged or merge conflicted; nothing was changed.
    Conflict,
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path, branch: &str) -> Result<(), ToolError>;

    async fn pull(&self, dest: &Path, branch: &str) -> Result<PullOutcome, ToolError>;

    async fn checkout(&self, dest: &Path, reference: &CommitRef) -> Result<(), ToolError>;

    /// Commit checked out in `dest`, or `None` when `dest` is not a repository.
    async fn head(&self, dest: &Path) -> Result<Option<CommitRef>, ToolError>;

    /// Commit the remote branch points at. Read-only.
    async fn remote_head(&self, url: &str, branch: &str) -> Result<CommitRef, ToolError>;

    /// Resolve `reference` to a commit known in `dest`, if any.
    async fn resolve(
        &self,
        dest: &Path,
        reference: &CommitRef,
    ) -> Result<Option<CommitRef>, ToolError>;
}

/// `git` CLI backed version control.
#[derive(Debug, Clone)]
pub struct Git {
    runner: ProcessRunner,
}

impl Git {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl VersionControl for Git {
    async fn clone_repo(&self, url: &str, dest: &Path, branch: &str) -> Result<(), ToolError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ToolError::File {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        let dest = dest.display().to_string();
        self.runner
            .run("git", &["clone", "--branch", branch, "--", url, &dest])
            .await
            .map(|_| ())
    }

    async fn pull(&self, dest: &Path, branch: &str) -> Result<PullOutcome, ToolError> {
        let before = self.head(dest).await?;

        // A rollback leaves HEAD detached; return to the branch first.
        self.runner.run_in(dest, "git", &["checkout", branch]).await?;

        let output = self
            .runner
            .output_in(dest, "git", &["pull", "--ff-only", "origin", branch])
            .await?;

        if !output.success() {
            let stderr = output.stderr.to_lowercase();
            if stderr.contains("conflict")
                || stderr.contains("fast-forward")
                || stderr.contains("diverg")
            {
                return Ok(PullOutcome::Conflict);
            }
            return Err(ToolError::Exit {
                command: format!("git pull --ff-only origin {branch}"),
                exit_code: output.exit_code,
                stderr_tail: tail_lines(output.stderr.trim(), STDERR_TAIL_LINES),
            });
        }

        let after = self.head(dest).await?;
        if before == after {
            Ok(PullOutcome::UpToDate)
        } else {
            Ok(PullOutcome::Updated)
        }
    }

    async fn checkout(&self, dest: &Path, reference: &CommitRef) -> Result<(), ToolError> {
        self.runner
            .run_in(dest, "git", &["checkout", "--detach", reference.as_str()])
            .await
            .map(|_| ())
    }

    async fn head(&self, dest: &Path) -> Result<Option<CommitRef>, ToolError> {
        if !dest.join(".git").exists() {
            return Ok(None);
        }
        let stdout = self.runner.run_in(dest, "git", &["rev-parse", "HEAD"]).await?;
        parse_commit("git rev-parse HEAD", &stdout).map(Some)
    }

    async fn remote_head(&self, url: &str, branch: &str) -> Result<CommitRef, ToolError> {
        let refspec = format!("refs/heads/{branch}");
        let stdout = self
            .runner
            .run("git", &["ls-remote", "--", url, &refspec])
            .await?;
        let hash = stdout.split_whitespace().next().unwrap_or_default();
        parse_commit("git ls-remote", hash)
    }

    async fn resolve(
        &self,
        dest: &Path,
        reference: &CommitRef,
    ) -> Result<Option<CommitRef>, ToolError> {
        let spec = format!("{}^{{commit}}", reference.as_str());
        let output = self
            .runner
            .output_in(dest, "git", &["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if !output.success() {
            return Ok(None);
        }
        parse_commit("git rev-parse --verify", &output.stdout).map(Some)
    }
}

fn parse_commit(command: &str, value: &str) -> Result<CommitRef, ToolError> {
    CommitRef::new(value).map_err(|e| {
        ParseSnafu {
            command,
            message: e.to_string(),
        }
        .build()
    })
}
