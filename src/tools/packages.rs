// ABOUTME: Package manager collaborator: installed check and install.
// ABOUTME: Process-backed implementation drives `dpkg-query` and `apt-get`.

use async_trait::async_trait;

use super::error::ToolError;
use super::process::ProcessRunner;

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn is_installed(&self, name: &str) -> Result<bool, ToolError>;

    async fn install(&self, name: &str) -> Result<(), ToolError>;
}

/// Debian/Ubuntu package manager.
#[derive(Debug, Clone)]
pub struct Apt {
    runner: ProcessRunner,
}

impl Apt {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner: runner.env("DEBIAN_FRONTEND", "noninteractive"),
        }
    }
}

#[async_trait]
impl PackageManager for Apt {
    async fn is_installed(&self, name: &str) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output("dpkg-query", &["-W", "-f=${Status}", name])
            .await?;
        Ok(output.success() && output.stdout.contains("install ok installed"))
    }

    async fn install(&self, name: &str) -> Result<(), ToolError> {
        self.runner
            .run("apt-get", &["install", "-y", "--no-install-recommends", name])
            .await
            .map(|_| ())
    }
}
