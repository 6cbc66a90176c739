// ABOUTME: Configuration types and parsing for deckhand.yml.
// ABOUTME: Handles YAML parsing, validation, path resolution, and profile selection.

mod env_value;
mod healthcheck;
mod init;
mod profile;
mod tls;

pub use env_value::{EnvValue, resolve_env_entries};
pub use healthcheck::HealthConfig;
pub use init::init_config;
pub use profile::DeploymentProfile;
pub use tls::TlsConfig;

use crate::error::{Error, Result};
use crate::tools::{ComposeSpec, FirewallRule, RuntimeType};
use crate::types::ComponentName;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "deckhand.yml";
pub const CONFIG_FILENAME_ALT: &str = "deckhand.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".deckhand/config.yml";

pub const REPORT_LOG_FILENAME: &str = "runs.jsonl";
pub const HISTORY_FILENAME: &str = "revisions.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Project name; keys the run lock.
    pub project: ComponentName,

    /// Directory the components and compose files live under.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Lock file, run log, and revision history.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(deserialize_with = "deserialize_components")]
    pub components: NonEmpty<ComponentConfig>,

    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, DeploymentProfile>,

    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    /// External container network shared by the stack.
    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub environment: Option<EnvFileConfig>,

    /// Extra files that must exist before deploying (proxy configs...).
    #[serde(default)]
    pub required_files: Vec<PathBuf>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub disk: DiskConfig,

    #[serde(default)]
    pub provision: ProvisionConfig,

    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,

    /// Ceiling on any single external command.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Directory the config file was loaded from.
    #[serde(skip)]
    source_dir: PathBuf,
}

/// A tracked code component checked out on the host.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    pub name: ComponentName,
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Checkout directory relative to the base directory; defaults to the name.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvFileConfig {
    #[serde(default = "default_env_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub entries: BTreeMap<String, EnvValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_service")]
    pub service: String,
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            service: default_proxy_service(),
            reload_command: default_reload_command(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_disk_threshold")]
    pub threshold_percent: u8,
    #[serde(default = "default_disk_path")]
    pub path: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        DiskConfig {
            threshold_percent: default_disk_threshold(),
            path: default_disk_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
    #[serde(default = "default_firewall")]
    pub firewall: Vec<FirewallRule>,
    #[serde(default = "default_true")]
    pub require_root: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        ProvisionConfig {
            packages: default_packages(),
            firewall: default_firewall(),
            require_root: true,
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/deckhand")
}

fn default_profiles() -> BTreeMap<String, DeploymentProfile> {
    BTreeMap::from([(default_profile_name(), DeploymentProfile::default())])
}

fn default_profile_name() -> String {
    "production".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_env_path() -> PathBuf {
    PathBuf::from(".env")
}

fn default_proxy_service() -> String {
    "nginx".to_string()
}

fn default_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}

fn default_disk_threshold() -> u8 {
    90
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_packages() -> Vec<String> {
    ["git", "ufw", "certbot", "docker.io", "docker-compose-v2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_firewall() -> Vec<FirewallRule> {
    vec![
        FirewallRule::tcp(22),
        FirewallRule::tcp(80),
        FirewallRule::tcp(443),
    ]
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        // `.deckhand/config.yml` belongs to the directory above `.deckhand`
        if config.source_dir.file_name().is_some_and(|n| n == ".deckhand") {
            config.source_dir.pop();
        }
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        Self::load(&Self::locate(dir)?)
    }

    /// First config file found in `dir`.
    pub fn locate(dir: &Path) -> Result<PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if !self.profiles.contains_key(&self.default_profile) {
            return Err(Error::InvalidConfig(format!(
                "default_profile '{}' is not defined in profiles",
                self.default_profile
            )));
        }

        let mut seen = HashSet::new();
        for component in self.components.iter() {
            if !seen.insert(&component.name) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate component: {}",
                    component.name
                )));
            }
        }

        if self.tls.domain.is_some() != self.tls.email.is_some() {
            return Err(Error::InvalidConfig(
                "tls.domain and tls.email must be set together".to_string(),
            ));
        }

        if !crate::certs::is_valid_schedule(&self.tls.schedule) {
            return Err(Error::InvalidConfig(format!(
                "tls.schedule must have five cron fields, got '{}'",
                self.tls.schedule
            )));
        }

        if self.disk.threshold_percent == 0 || self.disk.threshold_percent > 100 {
            return Err(Error::InvalidConfig(format!(
                "disk.threshold_percent must be between 1 and 100, got {}",
                self.disk.threshold_percent
            )));
        }

        if self.health.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health.interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Absolute (or config-relative) base directory.
    pub fn root(&self) -> PathBuf {
        self.source_dir.join(&self.base_dir)
    }

    /// Resolve a path relative to the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root().join(path)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.source_dir.join(&self.state_dir)
    }

    pub fn report_log_path(&self) -> PathBuf {
        self.state_dir().join(REPORT_LOG_FILENAME)
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join(HISTORY_FILENAME)
    }

    pub fn component_dir(&self, component: &ComponentConfig) -> PathBuf {
        match &component.path {
            Some(path) => self.resolve(path),
            None => self.root().join(component.name.as_str()),
        }
    }

    pub fn component(&self, name: &ComponentName) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| &c.name == name)
    }

    /// Look up a profile by name, or the default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &DeploymentProfile)> {
        let name = name.unwrap_or(&self.default_profile);
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    pub fn compose_spec(&self, profile: &DeploymentProfile) -> ComposeSpec {
        ComposeSpec {
            file: self.resolve(&profile.compose_target),
            profile: profile.compose_profile().map(str::to_string),
            build: profile.build_locally,
        }
    }

    /// Compose spec of the default profile.
    pub fn default_compose_spec(&self) -> ComposeSpec {
        match self.profiles.get(&self.default_profile) {
            Some(profile) => self.compose_spec(profile),
            None => self.compose_spec(&DeploymentProfile::default()),
        }
    }

    pub fn env_file_path(&self) -> Option<PathBuf> {
        self.environment.as_ref().map(|e| self.resolve(&e.path))
    }

    pub fn template() -> Self {
        Config {
            project: ComponentName::new("my-app").expect("template name is valid"),
            base_dir: PathBuf::from("/opt/my-app"),
            state_dir: default_state_dir(),
            runtime: None,
            components: NonEmpty::from((
                ComponentConfig {
                    name: ComponentName::new("backend").expect("template name is valid"),
                    repository: "https://github.com/example/my-app-backend.git".to_string(),
                    branch: default_branch(),
                    path: None,
                },
                vec![ComponentConfig {
                    name: ComponentName::new("frontend").expect("template name is valid"),
                    repository: "https://github.com/example/my-app-frontend.git".to_string(),
                    branch: default_branch(),
                    path: None,
                }],
            )),
            profiles: default_profiles(),
            default_profile: default_profile_name(),
            network: None,
            environment: None,
            required_files: Vec::new(),
            tls: TlsConfig::default(),
            proxy: ProxyConfig::default(),
            health: HealthConfig::default(),
            disk: DiskConfig::default(),
            provision: ProvisionConfig::default(),
            rollback_on_failure: true,
            command_timeout: default_command_timeout(),
            source_dir: PathBuf::new(),
        }
    }
}

fn deserialize_components<'de, D>(
    deserializer: D,
) -> std::result::Result<NonEmpty<ComponentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let components: Vec<ComponentConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(components)
        .ok_or_else(|| serde::de::Error::custom("at least one component is required"))
}
