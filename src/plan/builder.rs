// ABOUTME: Builds the plan each command runs from the loaded configuration.
// ABOUTME: Deploy, provision, ssl-setup, and renew-certs share one step vocabulary.

use std::path::PathBuf;

use crate::certs::{renewal_schedule_entry, schedule_marker};
use crate::config::{Config, DeploymentProfile, resolve_env_entries};
use crate::error::Result;
use crate::preflight::Capability;
use crate::tools::{ComposeSpec, RuntimeType};

use super::{Action, CertTarget, DeploymentPlan, Step, StepKind};

/// Everything beyond the config that plan construction needs.
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    pub config: &'a Config,
    pub runtime: RuntimeType,
    /// Command line the renewal schedule runs, without arguments of its own.
    pub renew_command: String,
}

impl<'a> PlanInputs<'a> {
    pub fn new(config: &'a Config, runtime: RuntimeType, renew_command: impl Into<String>) -> Self {
        Self {
            config,
            runtime,
            renew_command: renew_command.into(),
        }
    }

    fn sync_steps(&self, after: &str) -> Vec<Step> {
        self.config
            .components
            .iter()
            .map(|component| {
                Step::new(
                    format!("sync-{}", component.name),
                    StepKind::Sync,
                    Action::SyncRepository {
                        component: component.name.clone(),
                        url: component.repository.clone(),
                        branch: component.branch.clone(),
                        dest: self.config.component_dir(component),
                    },
                )
                .after(after)
            })
            .collect()
    }

    fn env_file_step(&self, kind: StepKind) -> Result<Option<Step>> {
        let (Some(env), Some(path)) = (&self.config.environment, self.config.env_file_path())
        else {
            return Ok(None);
        };
        let entries = resolve_env_entries(&env.entries)?;
        Ok(Some(Step::new(
            "env-file",
            kind,
            Action::WriteEnvFile { path, entries },
        )))
    }

    fn network_step(&self) -> Option<Step> {
        self.config.network.as_ref().map(|name| {
            Step::new(
                "network",
                StepKind::Provision,
                Action::CreateNetwork { name: name.clone() },
            )
            .with_key(format!("network:{name}"))
        })
    }

    fn schedule_step(&self, command: String) -> Step {
        let tls = &self.config.tls;
        let marker = schedule_marker(&self.config.project);
        let entry = renewal_schedule_entry(&tls.schedule, &command, &tls.renew_log, &marker);
        Step::new(
            "renew-schedule",
            StepKind::Provision,
            Action::InstallSchedule { entry, marker },
        )
    }

    fn certificate_step(&self, target: Option<CertTarget>) -> Step {
        Step::new(
            "certificate",
            StepKind::CertReconcile,
            Action::ReconcileCertificate { target },
        )
    }

    fn config_target(&self) -> Option<CertTarget> {
        self.config
            .tls
            .target()
            .map(|(domain, email)| CertTarget::new(domain, email))
    }

    fn verify_files(&self, compose: &ComposeSpec) -> Vec<PathBuf> {
        std::iter::once(compose.file.clone())
            .chain(self.config.required_files.iter().map(|p| self.config.resolve(p)))
            .collect()
    }

    /// Files that must exist before sync; those inside a checkout only appear after it.
    fn preflight_files(&self, compose: &ComposeSpec) -> Vec<Capability> {
        let checkouts: Vec<PathBuf> = self
            .config
            .components
            .iter()
            .map(|c| self.config.component_dir(c))
            .collect();
        self.verify_files(compose)
            .into_iter()
            .filter(|path| !checkouts.iter().any(|dir| path.starts_with(dir)))
            .map(Capability::File)
            .collect()
    }
}

/// preflight, [network], sync per component, [env-file], verify-config,
/// containers-up, health, certificate, cleanup.
pub fn deploy_plan(inputs: &PlanInputs<'_>, profile: &DeploymentProfile) -> Result<DeploymentPlan> {
    let config = inputs.config;
    let compose = config.compose_spec(profile);
    let expected = profile.expected_containers();

    let mut capabilities = vec![
        Capability::binary(inputs.runtime.binary()),
        Capability::binary("git"),
    ];
    capabilities.extend(inputs.preflight_files(&compose));
    let mut steps = vec![Step::new(
        "preflight",
        StepKind::Preflight,
        Action::CheckCapabilities(capabilities),
    )];

    let network = inputs.network_step();
    if let Some(step) = network.clone() {
        steps.push(step.after("preflight"));
    }

    let syncs = inputs.sync_steps("preflight");
    let sync_names: Vec<String> = syncs.iter().map(|s| s.name.clone()).collect();
    steps.extend(syncs);

    if let Some(step) = inputs.env_file_step(StepKind::ConfigCheck)? {
        steps.push(step.after_all(sync_names.clone()));
    }

    steps.push(
        Step::new(
            "verify-config",
            StepKind::ConfigCheck,
            Action::VerifyFiles {
                paths: inputs.verify_files(&compose),
            },
        )
        .after_all(sync_names),
    );

    let mut up = Step::new(
        "containers-up",
        StepKind::ContainerUp,
        Action::ContainersUp {
            compose: compose.clone(),
            expected,
        },
    )
    .with_rollback(Action::ContainersDown {
        compose: compose.clone(),
    })
    .after("verify-config");
    if let Some(network) = &network {
        up = up.after(network.name.clone());
    }
    steps.push(up);

    steps.push(
        Step::new(
            "health",
            StepKind::HealthCheck,
            Action::WaitHealthy {
                compose,
                expected,
                timeout: config.health.timeout,
                interval: config.health.interval,
            },
        )
        .after("containers-up"),
    );

    steps.push(inputs.certificate_step(inputs.config_target()).after("health"));
    steps.push(Step::new("cleanup", StepKind::Cleanup, Action::PruneImages).after("health"));

    Ok(DeploymentPlan::new(steps)?)
}

/// Host setup: packages, firewall, network, environment file, renewal
/// schedule, first checkout of every component.
pub fn provision_plan(inputs: &PlanInputs<'_>) -> Result<DeploymentPlan> {
    let config = inputs.config;
    let provision = &config.provision;

    let mut capabilities = vec![
        Capability::binary("apt-get"),
        Capability::binary("dpkg-query"),
        Capability::binary("crontab"),
    ];
    // ufw installed by this plan cannot be a precondition of it
    if !provision.firewall.is_empty() && !provision.packages.iter().any(|p| p == "ufw") {
        capabilities.push(Capability::binary("ufw"));
    }
    if provision.require_root {
        capabilities.insert(0, Capability::Root);
    }
    let mut steps = vec![Step::new(
        "preflight",
        StepKind::Preflight,
        Action::CheckCapabilities(capabilities),
    )];

    let mut packages = Vec::new();
    for name in &provision.packages {
        let step = Step::new(
            format!("package-{name}"),
            StepKind::Provision,
            Action::InstallPackage { name: name.clone() },
        )
        .after("preflight");
        packages.push(step.name.clone());
        steps.push(step);
    }

    let mut rules = Vec::new();
    for rule in &provision.firewall {
        let step = Step::new(
            format!("firewall-{}-{}", rule.port, rule.protocol),
            StepKind::Provision,
            Action::AllowFirewall { rule: *rule },
        )
        .after_all(packages.clone());
        rules.push(step.name.clone());
        steps.push(step);
    }
    // rules first, so enabling never locks out ssh
    steps.push(
        Step::new("firewall-enable", StepKind::Provision, Action::EnableFirewall)
            .after_all(rules),
    );

    if let Some(step) = inputs.network_step() {
        steps.push(step.after_all(packages.clone()));
    }
    if let Some(step) = inputs.env_file_step(StepKind::Provision)? {
        steps.push(step);
    }
    if config.tls.target().is_some() {
        steps.push(inputs.schedule_step(inputs.renew_command.clone()));
    }

    let syncs = inputs.sync_steps("preflight");
    let sync_names: Vec<String> = syncs.iter().map(|s| s.name.clone()).collect();
    steps.extend(syncs);

    let compose = config.default_compose_spec();
    steps.push(
        Step::new(
            "verify-config",
            StepKind::ConfigCheck,
            Action::VerifyFiles {
                paths: vec![compose.file],
            },
        )
        .after_all(sync_names),
    );

    Ok(DeploymentPlan::new(steps)?)
}

/// Issue (or renew) the certificate for an explicit domain and keep it renewed.
pub fn ssl_setup_plan(inputs: &PlanInputs<'_>, target: CertTarget) -> Result<DeploymentPlan> {
    let command = format!(
        "{} --domain {} --email {}",
        inputs.renew_command, target.domain, target.email
    );
    let steps = vec![
        Step::new(
            "preflight",
            StepKind::Preflight,
            Action::CheckCapabilities(vec![
                Capability::binary("certbot"),
                Capability::binary("openssl"),
                Capability::binary("crontab"),
                Capability::binary(inputs.runtime.binary()),
            ]),
        ),
        inputs.schedule_step(command).after("preflight"),
        inputs.certificate_step(Some(target)).after("preflight"),
    ];
    Ok(DeploymentPlan::new(steps)?)
}

/// The scheduled reconcile: only the certificate step.
pub fn renew_plan(inputs: &PlanInputs<'_>, target: Option<CertTarget>) -> Result<DeploymentPlan> {
    let target = target.or_else(|| inputs.config_target());
    let steps = vec![
        Step::new(
            "preflight",
            StepKind::Preflight,
            Action::CheckCapabilities(vec![
                Capability::binary("certbot"),
                Capability::binary("openssl"),
            ]),
        ),
        inputs.certificate_step(target).after("preflight"),
    ];
    Ok(DeploymentPlan::new(steps)?)
}
