// ABOUTME: Bounded wait for the expected number of running containers.
// ABOUTME: Polls the runtime's status listing until enough are running or time runs out.

use std::time::Duration;

use tokio::time::Instant;

use crate::tools::{ComposeSpec, ContainerRuntime, ContainerStatus};

use super::DeployError;

/// Poll `ps` every `interval` until `expected` containers run or `timeout` elapses.
pub async fn wait_for_containers(
    runtime: &dyn ContainerRuntime,
    compose: &ComposeSpec,
    expected: usize,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<ContainerStatus>, DeployError> {
    let deadline = Instant::now() + timeout;

    loop {
        let (listed, running) = match runtime.ps(compose).await {
            Ok(listed) => {
                let running = listed.iter().filter(|c| c.is_running()).count();
                (listed, running)
            }
            Err(e) => {
                tracing::debug!("container status unavailable: {e}");
                (Vec::new(), 0)
            }
        };

        tracing::debug!(running, expected, "health poll");
        if running >= expected {
            return Ok(listed);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DeployError::HealthCheckTimeout {
                expected,
                running,
                timeout,
            });
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
