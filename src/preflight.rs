// ABOUTME: Read-only precondition checks run before any mutating step.
// ABOUTME: Reports every missing binary, file, or privilege in a single pass.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tools::HostProbe;

/// Something the host must provide before a plan may mutate anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Program reachable through `PATH`.
    Binary(String),
    /// File that must already exist.
    File(PathBuf),
    /// Effective uid 0.
    Root,
}

impl Capability {
    pub fn binary(name: impl Into<String>) -> Self {
        Capability::Binary(name.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Capability::File(path.into())
    }

    /// Suggested fix shown next to a missing capability.
    pub fn remediation(&self) -> String {
        match self {
            Capability::Binary(name) => format!("install `{name}` (e.g. `apt-get install {name}`)"),
            Capability::File(path) => format!("create {}", path.display()),
            Capability::Root => "re-run with sudo".to_string(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Binary(name) => write!(f, "binary `{name}`"),
            Capability::File(path) => write!(f, "file {}", path.display()),
            Capability::Root => write!(f, "root privileges"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightReport {
    AllSatisfied,
    Missing(Vec<Capability>),
}

impl PreflightReport {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PreflightReport::AllSatisfied)
    }
}

/// Probe every capability; never stops at the first gap.
pub async fn check(probe: &dyn HostProbe, required: &[Capability]) -> PreflightReport {
    let mut missing = Vec::new();

    for capability in required {
        let present = match capability {
            Capability::Binary(name) => probe.binary_on_path(name).await,
            Capability::File(path) => probe.file_exists(path).await,
            Capability::Root => probe.is_root().await,
        };
        tracing::debug!(%capability, present, "preflight probe");
        if !present && !missing.contains(capability) {
            missing.push(capability.clone());
        }
    }

    if missing.is_empty() {
        PreflightReport::AllSatisfied
    } else {
        PreflightReport::Missing(missing)
    }
}

/// One line per missing capability, for the failure detail.
pub fn describe_missing(missing: &[Capability]) -> String {
    missing
        .iter()
        .map(|c| format!("missing {c}: {}", c.remediation()))
        .collect::<Vec<_>>()
        .join("\n")
}
