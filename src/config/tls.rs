// ABOUTME: TLS certificate settings: domain, contact email, renewal policy.
// ABOUTME: Absence of a domain means a plain-HTTP deployment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Renew when the certificate expires within this window.
    #[serde(default = "default_renew_before", with = "humantime_serde")]
    pub renew_before: Duration,

    /// Ceiling on a single issuance or renewal.
    #[serde(default = "default_issuance_timeout", with = "humantime_serde")]
    pub issuance_timeout: Duration,

    /// Cron expression for the recurring reconcile.
    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default = "default_live_dir")]
    pub live_dir: PathBuf,

    /// Where the scheduled renewal appends its output.
    #[serde(default = "default_renew_log")]
    pub renew_log: PathBuf,
}

fn default_renew_before() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

fn default_issuance_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_schedule() -> String {
    "0 3 * * *".to_string()
}

fn default_live_dir() -> PathBuf {
    PathBuf::from("/etc/letsencrypt/live")
}

fn default_renew_log() -> PathBuf {
    PathBuf::from("/var/log/deckhand-renew.log")
}

impl TlsConfig {
    /// Domain and email when TLS is configured.
    pub fn target(&self) -> Option<(&str, &str)> {
        match (&self.domain, &self.email) {
            (Some(domain), Some(email)) => Some((domain.as_str(), email.as_str())),
            _ => None,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            domain: None,
            email: None,
            renew_before: default_renew_before(),
            issuance_timeout: default_issuance_timeout(),
            schedule: default_schedule(),
            live_dir: default_live_dir(),
            renew_log: default_renew_log(),
        }
    }
}
