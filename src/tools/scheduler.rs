// ABOUTME: Recurring job scheduler collaborator.
// ABOUTME: Process-backed implementation edits the invoking user's crontab.

use async_trait::async_trait;

use super::error::ToolError;
use super::process::ProcessRunner;

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Current schedule lines.
    async fn entries(&self) -> Result<Vec<String>, ToolError>;

    /// Install `entry`, replacing any existing line that contains `marker`.
    async fn install(&self, entry: &str, marker: &str) -> Result<(), ToolError>;
}

/// `crontab` backed scheduler.
#[derive(Debug, Clone)]
pub struct Crontab {
    runner: ProcessRunner,
}

impl Crontab {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Scheduler for Crontab {
    async fn entries(&self) -> Result<Vec<String>, ToolError> {
        let output = self.runner.output("crontab", &["-l"]).await?;
        // `crontab -l` exits 1 with "no crontab for <user>" when empty.
        if !output.success() {
            return Ok(Vec::new());
        }
        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    async fn install(&self, entry: &str, marker: &str) -> Result<(), ToolError> {
        let existing = self.entries().await?;
        let table = replace_marked(&existing, entry, marker);
        self.runner
            .run_with_stdin("crontab", &["-"], table.as_bytes())
            .await
            .map(|_| ())
    }
}

/// Render a crontab with every line carrying `marker` replaced by `entry`.
pub fn replace_marked(existing: &[String], entry: &str, marker: &str) -> String {
    let mut lines: Vec<&str> = existing
        .iter()
        .map(String::as_str)
        .filter(|line| !line.contains(marker))
        .collect();
    lines.push(entry);
    let mut table = lines.join("\n");
    table.push('\n');
    table
}
