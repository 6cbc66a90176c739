// ABOUTME: Disk-pressure guard run before containers start.
// ABOUTME: One prune pass when over threshold, then a single re-measure.

use std::path::Path;

use tracing::{info, warn};

use crate::tools::{ContainerRuntime, HostProbe, ToolError};

use super::DeployError;

/// Result of the one prune pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPass {
    pub after: u8,
    /// Prune failure; the re-measure still decides.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskReport {
    pub before: u8,
    pub threshold: u8,
    pub cleanup: Option<CleanupPass>,
}

impl DiskReport {
    pub fn final_usage(&self) -> u8 {
        self.cleanup.as_ref().map_or(self.before, |c| c.after)
    }

    pub fn into_result(self) -> Result<(), DeployError> {
        let usage = self.final_usage();
        if usage > self.threshold {
            Err(DeployError::InsufficientDiskSpace {
                usage,
                threshold: self.threshold,
            })
        } else {
            Ok(())
        }
    }

    /// Line for the cleanup outcome in the run report.
    pub fn summary(&self) -> String {
        match &self.cleanup {
            None => format!("disk usage {}%", self.before),
            Some(pass) => {
                let mut text = format!("disk usage {}% -> {}% after prune", self.before, pass.after);
                if let Some(error) = &pass.error {
                    text.push_str(&format!(" (prune failed: {error})"));
                }
                text
            }
        }
    }
}

pub struct DiskGuard<'a> {
    runtime: &'a dyn ContainerRuntime,
    host: &'a dyn HostProbe,
    path: &'a Path,
    threshold: u8,
}

impl<'a> DiskGuard<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        host: &'a dyn HostProbe,
        path: &'a Path,
        threshold: u8,
    ) -> Self {
        Self {
            runtime,
            host,
            path,
            threshold,
        }
    }

    pub async fn check(&self) -> Result<DiskReport, ToolError> {
        let before = self.host.disk_usage_percent(self.path).await?;
        let mut report = DiskReport {
            before,
            threshold: self.threshold,
            cleanup: None,
        };
        if before <= self.threshold {
            return Ok(report);
        }

        info!(usage = before, threshold = self.threshold, "disk over threshold, pruning");
        let error = match self.runtime.prune(true).await {
            Ok(()) => None,
            Err(e) => {
                warn!("prune failed: {e}");
                Some(e.to_string())
            }
        };
        let after = self.host.disk_usage_percent(self.path).await?;
        report.cleanup = Some(CleanupPass { after, error });
        Ok(report)
    }
}
