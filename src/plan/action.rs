// ABOUTME: Actions a plan step performs, expressed as data.
// ABOUTME: Environment entries are redacted whenever an action is printed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::preflight::Capability;
use crate::tools::{ComposeSpec, FirewallRule};
use crate::types::{CommitRef, ComponentName};

/// Domain and contact address for a managed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertTarget {
    pub domain: String,
    pub email: String,
}

impl CertTarget {
    pub fn new(domain: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            email: email.into(),
        }
    }
}

/// Resolved environment-file entries. Values never leave through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct EnvEntries(BTreeMap<String, String>);

impl EnvEntries {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    /// File content, one `KEY=value` per line.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EnvEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.keys().map(|k| format!("{k}=<redacted>")))
            .finish()
    }
}

impl fmt::Display for EnvEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys().map(|k| format!("{k}=<redacted>")).collect();
        write!(f, "{}", keys.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CheckCapabilities(Vec<Capability>),
    InstallPackage {
        name: String,
    },
    AllowFirewall {
        rule: FirewallRule,
    },
    EnableFirewall,
    CreateNetwork {
        name: String,
    },
    /// Clone when absent, otherwise fast-forward to the remote branch head.
    SyncRepository {
        component: ComponentName,
        url: String,
        branch: String,
        dest: PathBuf,
    },
    CheckoutRevision {
        component: ComponentName,
        dest: PathBuf,
        reference: CommitRef,
    },
    WriteEnvFile {
        path: PathBuf,
        entries: EnvEntries,
    },
    /// Read-only: every path must exist.
    VerifyFiles {
        paths: Vec<PathBuf>,
    },
    ContainersUp {
        compose: ComposeSpec,
        expected: usize,
    },
    ContainersDown {
        compose: ComposeSpec,
    },
    WaitHealthy {
        compose: ComposeSpec,
        expected: usize,
        timeout: Duration,
        interval: Duration,
    },
    /// `None` when no certificate domain is configured.
    ReconcileCertificate {
        target: Option<CertTarget>,
    },
    PruneImages,
    InstallSchedule {
        entry: String,
        marker: String,
    },
}

impl Action {
    /// Whether the action only observes the host.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Action::CheckCapabilities(_) | Action::VerifyFiles { .. } | Action::WaitHealthy { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CheckCapabilities(caps) => write!(f, "check {} capabilities", caps.len()),
            Action::InstallPackage { name } => write!(f, "install package {name}"),
            Action::AllowFirewall { rule } => write!(f, "allow {rule}"),
            Action::EnableFirewall => write!(f, "enable firewall"),
            Action::CreateNetwork { name } => write!(f, "create network {name}"),
            Action::SyncRepository {
                component, branch, ..
            } => write!(f, "sync {component} ({branch})"),
            Action::CheckoutRevision {
                component,
                reference,
                ..
            } => write!(f, "checkout {component} at {}", reference.short()),
            Action::WriteEnvFile { path, entries } => {
                write!(f, "write {} [{entries}]", path.display())
            }
            Action::VerifyFiles { paths } => write!(f, "verify {} files", paths.len()),
            Action::ContainersUp { expected, .. } => write!(f, "start {expected} containers"),
            Action::ContainersDown { .. } => write!(f, "stop containers"),
            Action::WaitHealthy {
                expected, timeout, ..
            } => write!(
                f,
                "wait up to {}s for {expected} running containers",
                timeout.as_secs()
            ),
            Action::ReconcileCertificate { target: Some(t) } => {
                write!(f, "reconcile certificate for {}", t.domain)
            }
            Action::ReconcileCertificate { target: None } => write!(f, "no certificate configured"),
            Action::PruneImages => write!(f, "prune dangling images"),
            Action::InstallSchedule { marker, .. } => write!(f, "install schedule {marker}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> EnvEntries {
        EnvEntries::new(BTreeMap::from([
            ("DATABASE_URL".to_string(), "postgres://u:hunter2@db/app".to_string()),
            ("NODE_ENV".to_string(), "production".to_string()),
        ]))
    }

    #[test]
    fn render_is_sorted_key_value_lines() {
        assert_eq!(
            secrets().render(),
            "DATABASE_URL=postgres://u:hunter2@db/app\nNODE_ENV=production\n"
        );
    }

    #[test]
    fn values_never_printed() {
        let action = Action::WriteEnvFile {
            path: PathBuf::from("/srv/app/.env"),
            entries: secrets(),
        };
        let debug = format!("{action:?}");
        let display = action.to_string();
        for text in [debug, display] {
            assert!(!text.contains("hunter2"), "{text}");
            assert!(text.contains("DATABASE_URL=<redacted>"), "{text}");
        }
    }
}
