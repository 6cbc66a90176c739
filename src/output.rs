// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::plan::{RunReport, RunStatus, StepStatus};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.event("success", message, false),
        }
    }

    /// Print a non-fatal warning.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.event("warning", message, true),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.event("error", message, true),
        }
    }

    fn event(&self, event: &str, message: &str, to_stderr: bool) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if to_stderr {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }

    /// Print a finished run: step outcomes, warnings, and on failure the
    /// failing step, its diagnostic, and the remediation hint.
    pub fn report(&self, report: &RunReport) {
        if self.mode == OutputMode::Json {
            if let Ok(json) = serde_json::to_string(report) {
                println!("{json}");
            }
            return;
        }

        if self.mode == OutputMode::Normal {
            for outcome in &report.outcomes {
                let mark = match outcome.status {
                    StepStatus::Satisfied => "=",
                    StepStatus::Applied => "+",
                    StepStatus::Skipped => "-",
                    StepStatus::Failed(_) => "!",
                };
                println!("  {mark} {:<24} {}", outcome.step, outcome.status);
            }
            for container in &report.containers {
                println!("    {} ({}): {}", container.name, container.service, container.state);
            }
        }

        for warning in &report.warnings {
            self.warning(&warning.message);
        }

        if let Some(rollback) = &report.rollback {
            self.progress("Automatic rollback:");
            self.report(rollback);
        }

        match (&report.failure, report.status) {
            (None, RunStatus::Success) => self.success(&format!(
                "{} complete: {} applied, {} unchanged",
                report.command,
                report.applied(),
                report.outcomes.len() - report.applied()
            )),
            (None, _) => self.success(&format!("{} complete", report.command)),
            (Some(failure), _) => {
                self.error(&format!("step '{}' failed: {}", failure.step, failure.message));
                if let Some(diagnostic) = &failure.diagnostic {
                    eprintln!("{diagnostic}");
                }
                eprintln!("Remediation: {}", failure.remediation);
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
