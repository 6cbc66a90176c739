// ABOUTME: Config scaffolding for new hosts.
// ABOUTME: Creates a commented deckhand.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ComponentName;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, project: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(p) = project {
        config.project = ComponentName::new(p).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let mut components = String::new();
    for component in config.components.iter() {
        components.push_str(&format!(
            "  - name: {}\n    repository: {}\n    branch: {}\n",
            component.name, component.repository, component.branch
        ));
    }

    format!(
        r#"project: {project}
base_dir: {base_dir}
components:
{components}
profiles:
  production:
    compose_target: docker-compose.yml
  local-db:
    compose_target: docker-compose.yml
    use_local_database: true
default_profile: production

environment:
  path: .env
  entries:
    NODE_ENV: production
    # DATABASE_URL:
    #   env: DATABASE_URL

# Uncomment to manage a TLS certificate for the reverse proxy.
# tls:
#   domain: app.example.com
#   email: ops@example.com
#   renew_before: 30days
"#,
        project = config.project,
        base_dir = config.base_dir.display(),
        components = components,
    )
}
