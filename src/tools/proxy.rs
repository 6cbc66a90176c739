// ABOUTME: Reverse proxy collaborator used around certificate issuance and renewal.
// ABOUTME: Compose-backed implementation stops, starts, and reloads the proxy service.

use std::sync::Arc;

use async_trait::async_trait;

use super::container::{ComposeSpec, ContainerRuntime};
use super::error::ToolError;
use super::process::{STDERR_TAIL_LINES, tail_lines};

#[async_trait]
pub trait ReverseProxy: Send + Sync {
    /// Stop the proxy so its listening port is free.
    async fn stop(&self) -> Result<(), ToolError>;

    async fn start(&self) -> Result<(), ToolError>;

    /// Reload configuration without a full restart.
    async fn reload(&self) -> Result<(), ToolError>;
}

/// Proxy running as a compose service.
pub struct ComposeProxy {
    runtime: Arc<dyn ContainerRuntime>,
    spec: ComposeSpec,
    service: String,
    reload_command: Vec<String>,
}

impl ComposeProxy {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        spec: ComposeSpec,
        service: impl Into<String>,
        reload_command: Vec<String>,
    ) -> Self {
        Self {
            runtime,
            spec,
            service: service.into(),
            reload_command,
        }
    }
}

#[async_trait]
impl ReverseProxy for ComposeProxy {
    async fn stop(&self) -> Result<(), ToolError> {
        self.runtime.stop_service(&self.spec, &self.service).await
    }

    async fn start(&self) -> Result<(), ToolError> {
        self.runtime.start_service(&self.spec, &self.service).await
    }

    async fn reload(&self) -> Result<(), ToolError> {
        let output = self
            .runtime
            .exec(&self.spec, &self.service, &self.reload_command)
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(ToolError::Exit {
                command: format!("exec {} {}", self.service, self.reload_command.join(" ")),
                exit_code: output.exit_code,
                stderr_tail: tail_lines(output.stderr.trim(), STDERR_TAIL_LINES),
            })
        }
    }
}
