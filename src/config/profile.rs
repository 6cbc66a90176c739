// ABOUTME: Deployment profiles: named variants of the deploy plan.
// ABOUTME: Select compose target, local database service, and build-vs-pull.

use serde::Deserialize;
use std::path::PathBuf;

/// One way of bringing the stack up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentProfile {
    /// Enable the compose profile that runs a database container on this host.
    #[serde(default)]
    pub use_local_database: bool,

    /// Build images from the synced sources instead of pulling them.
    #[serde(default)]
    pub build_locally: bool,

    /// Compose file, relative to the base directory.
    #[serde(default = "default_compose_target")]
    pub compose_target: PathBuf,

    /// Containers that must be running before the health check passes.
    #[serde(default)]
    pub expected_containers: Option<usize>,

    /// Compose profile name enabled by `use_local_database`.
    #[serde(default = "default_database_profile")]
    pub database_profile: String,
}

fn default_compose_target() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_database_profile() -> String {
    "local-db".to_string()
}

impl DeploymentProfile {
    /// Backend, frontend, and proxy, plus the database when it runs locally.
    pub fn expected_containers(&self) -> usize {
        self.expected_containers
            .unwrap_or(3 + usize::from(self.use_local_database))
    }

    /// Compose profile to enable, if any.
    pub fn compose_profile(&self) -> Option<&str> {
        self.use_local_database
            .then_some(self.database_profile.as_str())
    }
}

impl Default for DeploymentProfile {
    fn default() -> Self {
        DeploymentProfile {
            use_local_database: false,
            build_locally: false,
            compose_target: default_compose_target(),
            expected_containers: None,
            database_profile: default_database_profile(),
        }
    }
}
