// ABOUTME: Container runtime collaborator: compose lifecycle, status, and logs.
// ABOUTME: Process-backed implementation drives `docker compose` or `podman compose`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::detection::RuntimeType;
use super::error::{ParseSnafu, ToolError};
use super::process::{CommandOutput, ProcessRunner};

/// Identifies one compose stack: file, optional profile, build mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSpec {
    pub file: PathBuf,
    pub profile: Option<String>,
    /// Build images locally instead of pulling them.
    pub build: bool,
}

impl ComposeSpec {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            profile: None,
            build: false,
        }
    }

    /// Directory compose commands run from.
    pub fn project_dir(&self) -> &Path {
        self.file.parent().unwrap_or_else(|| Path::new("."))
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.file.display().to_string(),
        ];
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }
}

/// Observed state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub service: String,
    pub state: String,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Operations the orchestrator needs from the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start the stack; returns statuses after start.
    async fn up(&self, spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError>;

    /// Stop and remove the stack's containers.
    async fn down(&self, spec: &ComposeSpec) -> Result<(), ToolError>;

    /// Pull the stack's images.
    async fn pull(&self, spec: &ComposeSpec) -> Result<(), ToolError>;

    /// List the stack's containers, including stopped ones.
    async fn ps(&self, spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError>;

    /// Run a command inside a service's container.
    async fn exec(
        &self,
        spec: &ComposeSpec,
        service: &str,
        command: &[String],
    ) -> Result<CommandOutput, ToolError>;

    /// Last `tail` lines of a service's output.
    async fn logs(
        &self,
        spec: &ComposeSpec,
        service: &str,
        tail: usize,
    ) -> Result<Vec<String>, ToolError>;

    async fn stop_service(&self, spec: &ComposeSpec, service: &str) -> Result<(), ToolError>;

    async fn start_service(&self, spec: &ComposeSpec, service: &str) -> Result<(), ToolError>;

    /// Number of dangling images.
    async fn dangling_images(&self) -> Result<usize, ToolError>;

    /// Remove unused images (and volumes when asked).
    async fn prune(&self, include_volumes: bool) -> Result<(), ToolError>;

    async fn network_exists(&self, name: &str) -> Result<bool, ToolError>;

    async fn create_network(&self, name: &str) -> Result<(), ToolError>;
}

/// Compose CLI backed runtime.
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    runtime: RuntimeType,
    runner: ProcessRunner,
}

impl ComposeRuntime {
    pub fn new(runtime: RuntimeType, runner: ProcessRunner) -> Self {
        Self { runtime, runner }
    }

    fn program(&self) -> &'static str {
        self.runtime.binary()
    }

    async fn compose(&self, spec: &ComposeSpec, extra: &[&str]) -> Result<String, ToolError> {
        let mut args = spec.base_args();
        args.extend(extra.iter().map(|a| a.to_string()));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .run_in(spec.project_dir(), self.program(), &args)
            .await
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn up(&self, spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError> {
        let mut args = vec!["up", "-d", "--remove-orphans"];
        if spec.build {
            args.push("--build");
        }
        self.compose(spec, &args).await?;
        self.ps(spec).await
    }

    async fn down(&self, spec: &ComposeSpec) -> Result<(), ToolError> {
        self.compose(spec, &["down"]).await.map(|_| ())
    }

    async fn pull(&self, spec: &ComposeSpec) -> Result<(), ToolError> {
        self.compose(spec, &["pull"]).await.map(|_| ())
    }

    async fn ps(&self, spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError> {
        let stdout = self.compose(spec, &["ps", "-a", "--format", "json"]).await?;
        parse_ps_output(&stdout)
    }

    async fn exec(
        &self,
        spec: &ComposeSpec,
        service: &str,
        command: &[String],
    ) -> Result<CommandOutput, ToolError> {
        let mut args = spec.base_args();
        args.extend(["exec".to_string(), "-T".to_string(), service.to_string()]);
        args.extend(command.iter().cloned());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .output_in(spec.project_dir(), self.program(), &args)
            .await
    }

    async fn logs(
        &self,
        spec: &ComposeSpec,
        service: &str,
        tail: usize,
    ) -> Result<Vec<String>, ToolError> {
        let tail = tail.to_string();
        let stdout = self
            .compose(spec, &["logs", "--no-color", "--tail", &tail, service])
            .await?;
        Ok(stdout.lines().map(str::to_string).collect())
    }

    async fn stop_service(&self, spec: &ComposeSpec, service: &str) -> Result<(), ToolError> {
        self.compose(spec, &["stop", service]).await.map(|_| ())
    }

    async fn start_service(&self, spec: &ComposeSpec, service: &str) -> Result<(), ToolError> {
        self.compose(spec, &["start", service]).await.map(|_| ())
    }

    async fn dangling_images(&self) -> Result<usize, ToolError> {
        let stdout = self
            .runner
            .run(self.program(), &["images", "-f", "dangling=true", "-q"])
            .await?;
        Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count())
    }

    async fn prune(&self, include_volumes: bool) -> Result<(), ToolError> {
        self.runner
            .run(self.program(), &["image", "prune", "-f"])
            .await?;
        if include_volumes {
            self.runner
                .run(self.program(), &["volume", "prune", "-f"])
                .await?;
        }
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output(self.program(), &["network", "inspect", name])
            .await?;
        Ok(output.success())
    }

    async fn create_network(&self, name: &str) -> Result<(), ToolError> {
        self.runner
            .run(self.program(), &["network", "create", name])
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State")]
    state: String,
}

/// Parse `compose ps --format json`, which is a JSON array on older
/// releases and JSON lines on newer ones.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerStatus>, ToolError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| {
            ParseSnafu {
                command: "compose ps",
                message: e.to_string(),
            }
            .build()
        })?
    } else {
        trimmed
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<PsEntry>(l))
            .collect::<Result<_, _>>()
            .map_err(|e| {
                ParseSnafu {
                    command: "compose ps",
                    message: e.to_string(),
                }
                .build()
            })?
    };

    Ok(entries
        .into_iter()
        .map(|e| ContainerStatus {
            name: e.name,
            service: e.service,
            state: e.state,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_lines_output() {
        let stdout = r#"{"Name":"app-backend-1","Service":"backend","State":"running"}
{"Name":"app-nginx-1","Service":"nginx","State":"exited"}"#;
        let statuses = parse_ps_output(stdout).unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_running());
        assert_eq!(statuses[1].service, "nginx");
        assert!(!statuses[1].is_running());
    }

    #[test]
    fn parses_json_array_output() {
        let stdout = r#"[{"Name":"app-frontend-1","Service":"frontend","State":"running"}]"#;
        let statuses = parse_ps_output(stdout).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "app-frontend-1");
    }

    #[test]
    fn empty_output_means_no_containers() {
        assert!(parse_ps_output("  \n").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_parse_error() {
        let err = parse_ps_output("not json").unwrap_err();
        assert!(err.to_string().contains("compose ps"));
    }

    #[test]
    fn compose_args_include_profile() {
        let spec = ComposeSpec {
            file: PathBuf::from("/srv/app/docker-compose.yml"),
            profile: Some("local-db".to_string()),
            build: false,
        };
        assert_eq!(
            spec.base_args(),
            vec![
                "compose",
                "-f",
                "/srv/app/docker-compose.yml",
                "--profile",
                "local-db"
            ]
        );
        assert_eq!(spec.project_dir(), Path::new("/srv/app"));
    }
}
