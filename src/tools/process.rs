// ABOUTME: Runs external programs with captured output and a bounded wait.
// ABOUTME: Shared by every process-backed collaborator implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::{ExitSnafu, SpawnSnafu, TimeoutSnafu, ToolError};

/// Number of stderr lines kept in error diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Return the last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Spawns commands with a per-command timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
            envs: Vec::new(),
        }
    }

    /// Run commands from the given directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for every spawned command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a command and capture its output. A non-zero exit is not an error.
    pub async fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        self.spawn(program, args, None, None).await
    }

    /// Run a command in `dir` and capture its output.
    pub async fn output_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ToolError> {
        self.spawn(program, args, Some(dir), None).await
    }

    /// Run a command and return trimmed stdout; a non-zero exit is an error.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, ToolError> {
        let output = self.spawn(program, args, None, None).await?;
        check(program, args, output)
    }

    /// Like `run`, from `dir`.
    pub async fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, ToolError> {
        let output = self.spawn(program, args, Some(dir), None).await?;
        check(program, args, output)
    }

    /// Run a command feeding `stdin_data` to its standard input.
    pub async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin_data: &[u8],
    ) -> Result<String, ToolError> {
        let output = self.spawn(program, args, None, Some(stdin_data)).await?;
        check(program, args, output)
    }

    async fn spawn(
        &self,
        program: &str,
        args: &[&str],
        dir: Option<&Path>,
        stdin_data: Option<&[u8]>,
    ) -> Result<CommandOutput, ToolError> {
        let command_line = format_command(program, args);
        tracing::debug!("running `{}`", command_line);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = dir.or(self.working_dir.as_deref()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn().context(SpawnSnafu { program })?;

        if let Some(data) = stdin_data
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(data)
                .await
                .context(SpawnSnafu { program })?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context(SpawnSnafu { program })?,
            Err(_) => {
                return TimeoutSnafu {
                    command: command_line,
                    timeout: self.timeout,
                }
                .fail();
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn check(program: &str, args: &[&str], output: CommandOutput) -> Result<String, ToolError> {
    if output.success() {
        return Ok(output.stdout.trim().to_string());
    }
    ExitSnafu {
        command: format_command(program, args),
        exit_code: output.exit_code,
        stderr_tail: tail_lines(output.stderr.trim(), STDERR_TAIL_LINES),
    }
    .fail()
}

pub(crate) fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(tail_lines(text, 2), "three\nfour");
        assert_eq!(tail_lines(text, 10), text);
        assert_eq!(tail_lines("", 3), "");
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let out = runner.run("sh", &["-c", "echo hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr_tail() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run("sh", &["-c", "echo boom >&2; exit 3"])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        assert_eq!(err.kind(), super::super::ToolErrorKind::Timeout);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let err = runner
            .run("deckhand-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), super::super::ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let out = runner
            .run_with_stdin("cat", &[], b"line from stdin\n")
            .await
            .unwrap();
        assert_eq!(out, "line from stdin");
    }
}
