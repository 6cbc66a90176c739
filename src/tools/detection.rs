// ABOUTME: Container runtime detection for the local host.
// ABOUTME: Checks for Podman sockets first, then Docker, unless configured explicitly.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    /// CLI binary that provides the `compose` subcommand.
    pub fn binary(self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary())
    }
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Resolve the runtime to drive.
///
/// An explicit setting wins. Otherwise the local sockets are checked in order:
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
///
/// With nothing found Docker is assumed, so preflight reports the missing binary.
pub fn detect_local(explicit: Option<RuntimeType>) -> RuntimeType {
    if let Some(runtime) = explicit {
        return runtime;
    }

    if let Some(uid) = get_uid() {
        let rootless_socket = format!("/run/user/{}/podman/podman.sock", uid);
        if Path::new(&rootless_socket).exists() {
            return RuntimeType::Podman;
        }
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return RuntimeType::Podman;
    }

    if !Path::new(DOCKER_SOCKET).exists() {
        tracing::debug!("no runtime socket found, assuming docker");
    }
    RuntimeType::Docker
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        // Fall back to reading /proc/self/status
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_runtime_wins() {
        assert_eq!(detect_local(Some(RuntimeType::Podman)), RuntimeType::Podman);
        assert_eq!(detect_local(Some(RuntimeType::Docker)), RuntimeType::Docker);
    }

    #[test]
    fn runtime_type_deserializes_lowercase() {
        let rt: RuntimeType = serde_yaml::from_str("podman").unwrap();
        assert_eq!(rt, RuntimeType::Podman);
        assert_eq!(rt.to_string(), "podman");
    }
}
