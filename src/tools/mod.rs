// ABOUTME: External collaborators the orchestrator drives through narrow traits.
// ABOUTME: Container runtime, git, certificate authority, proxy, firewall, packages, cron, host.

mod certbot;
mod container;
mod detection;
mod error;
mod firewall;
mod host;
mod packages;
mod process;
mod proxy;
mod scheduler;
mod vcs;

pub use certbot::{CertificateAuthority, Certbot, parse_enddate};
pub use container::{ComposeRuntime, ComposeSpec, ContainerRuntime, ContainerStatus, parse_ps_output};
pub use detection::{RuntimeType, detect_local};
pub use error::{ToolError, ToolErrorKind};
pub use firewall::{Firewall, FirewallRule, Protocol, Ufw};
pub use host::{HostProbe, LocalHost};
pub use packages::{Apt, PackageManager};
pub use process::{CommandOutput, ProcessRunner, STDERR_TAIL_LINES, tail_lines};
pub use proxy::{ComposeProxy, ReverseProxy};
pub use scheduler::{Crontab, Scheduler};
pub use vcs::{Git, PullOutcome, VersionControl};

use std::sync::Arc;

use crate::config::Config;

/// Every collaborator a run may touch, as shared trait objects.
#[derive(Clone)]
pub struct Toolbox {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub vcs: Arc<dyn VersionControl>,
    pub authority: Arc<dyn CertificateAuthority>,
    pub proxy: Arc<dyn ReverseProxy>,
    pub firewall: Arc<dyn Firewall>,
    pub packages: Arc<dyn PackageManager>,
    pub scheduler: Arc<dyn Scheduler>,
    pub host: Arc<dyn HostProbe>,
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox").finish_non_exhaustive()
    }
}

impl Toolbox {
    /// Process-backed collaborators for the local host.
    ///
    /// `runtime_type` is normally the result of [`detect_local`].
    pub fn local(config: &Config, runtime_type: RuntimeType) -> Self {
        let runner = ProcessRunner::new(config.command_timeout);
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(ComposeRuntime::new(runtime_type, runner.clone()));

        let proxy_spec = config.default_compose_spec();
        let proxy = ComposeProxy::new(
            runtime.clone(),
            proxy_spec,
            config.proxy.service.clone(),
            config.proxy.reload_command.clone(),
        );

        // certbot enforces its own timeouts; the issuance ceiling is applied by the caller
        let certbot_runner = runner.clone().with_timeout(config.tls.issuance_timeout * 2);

        Self {
            runtime,
            vcs: Arc::new(Git::new(runner.clone())),
            authority: Arc::new(Certbot::new(config.tls.live_dir.clone(), certbot_runner)),
            proxy: Arc::new(proxy),
            firewall: Arc::new(Ufw::new(runner.clone())),
            packages: Arc::new(Apt::new(runner.clone())),
            scheduler: Arc::new(Crontab::new(runner.clone())),
            host: Arc::new(LocalHost::new(runner)),
        }
    }
}
