// ABOUTME: Firewall collaborator: allow rules and enable the firewall.
// ABOUTME: Process-backed implementation drives `ufw`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::ToolError;
use super::process::ProcessRunner;

/// Transport protocol of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A `port/proto` allow rule, e.g. `443/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirewallRule {
    pub port: u16,
    pub protocol: Protocol,
}

impl FirewallRule {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for FirewallRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, proto) = s.split_once('/').unwrap_or((s, "tcp"));
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| format!("invalid port in firewall rule: {s}"))?;
        let protocol = match proto.trim().to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            other => return Err(format!("unknown protocol in firewall rule: {other}")),
        };
        Ok(Self { port, protocol })
    }
}

impl Serialize for FirewallRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FirewallRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[async_trait]
pub trait Firewall: Send + Sync {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), ToolError>;

    async fn enable(&self) -> Result<(), ToolError>;

    async fn is_allowed(&self, rule: &FirewallRule) -> Result<bool, ToolError>;

    async fn is_enabled(&self) -> Result<bool, ToolError>;
}

/// `ufw` backed firewall.
#[derive(Debug, Clone)]
pub struct Ufw {
    runner: ProcessRunner,
}

impl Ufw {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    async fn status(&self) -> Result<String, ToolError> {
        self.runner.run("ufw", &["status"]).await
    }
}

#[async_trait]
impl Firewall for Ufw {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), ToolError> {
        let rule = rule.to_string();
        self.runner.run("ufw", &["allow", &rule]).await.map(|_| ())
    }

    async fn enable(&self) -> Result<(), ToolError> {
        self.runner.run("ufw", &["--force", "enable"]).await.map(|_| ())
    }

    async fn is_allowed(&self, rule: &FirewallRule) -> Result<bool, ToolError> {
        Ok(status_allows(&self.status().await?, rule))
    }

    async fn is_enabled(&self) -> Result<bool, ToolError> {
        Ok(status_is_active(&self.status().await?))
    }
}

/// Whether `ufw status` output has an ALLOW line for `rule`.
pub fn status_allows(status: &str, rule: &FirewallRule) -> bool {
    let wanted = rule.to_string();
    status.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.next() == Some(wanted.as_str()) && line.contains("ALLOW")
    })
}

pub fn status_is_active(status: &str) -> bool {
    status
        .lines()
        .any(|l| l.trim().eq_ignore_ascii_case("status: active"))
}
