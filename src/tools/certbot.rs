// ABOUTME: Certificate authority collaborator: obtain, renew, and expiry lookup.
// ABOUTME: Process-backed implementation drives `certbot` and reads expiry with `openssl`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::{ParseSnafu, ToolError};
use super::process::ProcessRunner;

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Request a new certificate. Needs the HTTP port to be free.
    async fn obtain(&self, domain: &str, email: &str) -> Result<(), ToolError>;

    /// Renew the existing certificate for `domain`.
    async fn renew(&self, domain: &str) -> Result<(), ToolError>;

    /// Expiry of the current certificate, `None` when there is none.
    async fn current_expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, ToolError>;

    /// Where the certificate chain for `domain` lives.
    fn certificate_path(&self, domain: &str) -> PathBuf;
}

/// `certbot` in standalone mode.
#[derive(Debug, Clone)]
pub struct Certbot {
    live_dir: PathBuf,
    runner: ProcessRunner,
}

impl Certbot {
    pub fn new(live_dir: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            live_dir: live_dir.into(),
            runner,
        }
    }
}

#[async_trait]
impl CertificateAuthority for Certbot {
    async fn obtain(&self, domain: &str, email: &str) -> Result<(), ToolError> {
        self.runner
            .run(
                "certbot",
                &[
                    "certonly",
                    "--standalone",
                    "--non-interactive",
                    "--agree-tos",
                    "--email",
                    email,
                    "-d",
                    domain,
                ],
            )
            .await
            .map(|_| ())
    }

    async fn renew(&self, domain: &str) -> Result<(), ToolError> {
        self.runner
            .run(
                "certbot",
                // the renewal window is decided by the caller
                &[
                    "renew",
                    "--non-interactive",
                    "--force-renewal",
                    "--cert-name",
                    domain,
                ],
            )
            .await
            .map(|_| ())
    }

    async fn current_expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, ToolError> {
        let path = self.certificate_path(domain);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let path = path.display().to_string();
        let stdout = self
            .runner
            .run("openssl", &["x509", "-enddate", "-noout", "-in", &path])
            .await?;
        parse_enddate(&stdout).map(Some)
    }

    fn certificate_path(&self, domain: &str) -> PathBuf {
        self.live_dir.join(domain).join("fullchain.pem")
    }
}

/// Parse `notAfter=Mar  5 12:00:00 2027 GMT`.
pub fn parse_enddate(stdout: &str) -> Result<DateTime<Utc>, ToolError> {
    let value = stdout
        .trim()
        .strip_prefix("notAfter=")
        .unwrap_or(stdout.trim());
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            ParseSnafu {
                command: "openssl x509 -enddate",
                message: format!("{e}: {value}"),
            }
            .build()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_openssl_enddate() {
        let at = parse_enddate("notAfter=Mar 15 12:30:00 2027 GMT\n").unwrap();
        assert_eq!((at.year(), at.month(), at.day()), (2027, 3, 15));
        assert_eq!((at.hour(), at.minute()), (12, 30));
    }

    #[test]
    fn parses_space_padded_day() {
        let at = parse_enddate("notAfter=Jan  5 00:00:00 2027 GMT").unwrap();
        assert_eq!(at.day(), 5);
    }

    #[test]
    fn rejects_unexpected_output() {
        assert!(parse_enddate("unable to load certificate").is_err());
    }

    #[test]
    fn certificate_path_follows_live_layout() {
        let certbot = Certbot::new(
            "/etc/letsencrypt/live",
            ProcessRunner::new(std::time::Duration::from_secs(1)),
        );
        assert_eq!(
            certbot.certificate_path("example.com"),
            PathBuf::from("/etc/letsencrypt/live/example.com/fullchain.pem")
        );
    }
}
