// ABOUTME: Test support utilities.
// ABOUTME: An in-memory host standing in for every external collaborator, plus config fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deckhand::config::Config;
use deckhand::tools::{
    CertificateAuthority, CommandOutput, ComposeSpec, ContainerRuntime, ContainerStatus, Firewall,
    FirewallRule, HostProbe, PackageManager, PullOutcome, ReverseProxy, Scheduler, ToolError,
    Toolbox, VersionControl,
};
use deckhand::types::CommitRef;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("deckhand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Everything the fake host remembers. Tests poke at it directly.
#[derive(Debug, Default)]
pub struct HostState {
    // container runtime
    pub services: Vec<String>,
    pub containers: Vec<ContainerStatus>,
    pub up_calls: usize,
    pub down_calls: usize,
    pub networks: BTreeSet<String>,
    pub dangling_images: usize,
    pub prunes: Vec<bool>,
    /// `up` fails while any checkout sits on one of these commits.
    pub broken_commits: BTreeSet<String>,

    // version control
    pub remotes: BTreeMap<String, String>,
    pub known_commits: BTreeSet<String>,
    pub heads: BTreeMap<PathBuf, String>,
    pub origins: BTreeMap<PathBuf, String>,
    pub checkouts: Vec<(PathBuf, String)>,
    pub vcs_calls: usize,

    // host
    pub binaries: BTreeSet<String>,
    pub files: BTreeSet<PathBuf>,
    pub root: bool,
    pub disk_usage: u8,
    pub disk_after_prune: Option<u8>,

    // certificates and proxy
    pub expiry: Option<DateTime<Utc>>,
    pub obtain_fails: bool,
    pub obtain_delay: Option<Duration>,
    pub proxy_start_fails: bool,
    pub proxy_calls: Vec<&'static str>,
    pub authority_calls: Vec<&'static str>,

    // provisioning
    pub packages: BTreeSet<String>,
    pub firewall_rules: Vec<FirewallRule>,
    pub firewall_enabled: bool,
    pub crontab: Vec<String>,
}

/// In-memory stand-in for the machine deckhand drives.
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    /// A host with every tool installed, plenty of disk, and a three-service stack.
    pub fn ready() -> Self {
        let host = Self::default();
        {
            let mut state = host.state();
            state.services = vec!["backend".into(), "frontend".into(), "nginx".into()];
            state.binaries = [
                "docker",
                "podman",
                "git",
                "certbot",
                "openssl",
                "crontab",
                "apt-get",
                "dpkg-query",
                "ufw",
            ]
            .into_iter()
            .map(String::from)
            .collect();
            state.root = true;
            state.disk_usage = 40;
        }
        host
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock()
    }

    /// Point a remote branch at `commit`.
    pub fn publish(&self, url: &str, commit: &str) {
        let mut state = self.state();
        state.remotes.insert(url.to_string(), commit.to_string());
        state.known_commits.insert(commit.to_string());
    }

    pub fn head(&self, dest: &Path) -> Option<String> {
        self.state().heads.get(dest).cloned()
    }

    pub fn toolbox(&self) -> Toolbox {
        Toolbox {
            runtime: Arc::new(self.clone()),
            vcs: Arc::new(self.clone()),
            authority: Arc::new(self.clone()),
            proxy: Arc::new(self.clone()),
            firewall: Arc::new(self.clone()),
            packages: Arc::new(self.clone()),
            scheduler: Arc::new(self.clone()),
            host: Arc::new(self.clone()),
        }
    }
}

fn commit(value: &str) -> CommitRef {
    CommitRef::new(value).unwrap()
}

#[async_trait]
impl ContainerRuntime for FakeHost {
    async fn up(&self, _spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError> {
        let mut state = self.state();
        state.up_calls += 1;

        let broken = state.heads.values().any(|h| state.broken_commits.contains(h));
        if broken {
            state.containers.clear();
            return Err(ToolError::failed("docker compose up", "service backend failed to build"));
        }

        state.containers = state
            .services
            .iter()
            .map(|service| ContainerStatus {
                name: format!("shop-{service}-1"),
                service: service.clone(),
                state: "running".to_string(),
            })
            .collect();
        Ok(state.containers.clone())
    }

    async fn down(&self, _spec: &ComposeSpec) -> Result<(), ToolError> {
        let mut state = self.state();
        state.down_calls += 1;
        state.containers.clear();
        Ok(())
    }

    async fn pull(&self, _spec: &ComposeSpec) -> Result<(), ToolError> {
        Ok(())
    }

    async fn ps(&self, _spec: &ComposeSpec) -> Result<Vec<ContainerStatus>, ToolError> {
        Ok(self.state().containers.clone())
    }

    async fn exec(
        &self,
        _spec: &ComposeSpec,
        _service: &str,
        _command: &[String],
    ) -> Result<CommandOutput, ToolError> {
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn logs(
        &self,
        _spec: &ComposeSpec,
        service: &str,
        tail: usize,
    ) -> Result<Vec<String>, ToolError> {
        Ok((1..=tail.min(3))
            .map(|n| format!("{service} log line {n}"))
            .collect())
    }

    async fn stop_service(&self, _spec: &ComposeSpec, _service: &str) -> Result<(), ToolError> {
        Ok(())
    }

    async fn start_service(&self, _spec: &ComposeSpec, _service: &str) -> Result<(), ToolError> {
        Ok(())
    }

    async fn dangling_images(&self) -> Result<usize, ToolError> {
        Ok(self.state().dangling_images)
    }

    async fn prune(&self, include_volumes: bool) -> Result<(), ToolError> {
        let mut state = self.state();
        state.prunes.push(include_volumes);
        state.dangling_images = 0;
        if let Some(after) = state.disk_after_prune {
            state.disk_usage = after;
        }
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, ToolError> {
        Ok(self.state().networks.contains(name))
    }

    async fn create_network(&self, name: &str) -> Result<(), ToolError> {
        self.state().networks.insert(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl VersionControl for FakeHost {
    async fn clone_repo(&self, url: &str, dest: &Path, _branch: &str) -> Result<(), ToolError> {
        let mut state = self.state();
        state.vcs_calls += 1;
        let Some(head) = state.remotes.get(url).cloned() else {
            return Err(ToolError::failed(format!("git clone {url}"), "repository not found"));
        };
        state.heads.insert(dest.to_path_buf(), head);
        state.origins.insert(dest.to_path_buf(), url.to_string());
        Ok(())
    }

    async fn pull(&self, dest: &Path, _branch: &str) -> Result<PullOutcome, ToolError> {
        let mut state = self.state();
        state.vcs_calls += 1;
        let remote = state
            .origins
            .get(dest)
            .and_then(|url| state.remotes.get(url))
            .cloned();
        let Some(remote) = remote else {
            return Err(ToolError::failed("git pull", "no origin"));
        };
        let previous = state.heads.insert(dest.to_path_buf(), remote.clone());
        if previous.as_deref() == Some(remote.as_str()) {
            Ok(PullOutcome::UpToDate)
        } else {
            Ok(PullOutcome::Updated)
        }
    }

    async fn checkout(&self, dest: &Path, reference: &CommitRef) -> Result<(), ToolError> {
        let mut state = self.state();
        state.vcs_calls += 1;
        if !state.known_commits.contains(reference.as_str()) {
            return Err(ToolError::failed(
                format!("git checkout {reference}"),
                "pathspec did not match",
            ));
        }
        state
            .checkouts
            .push((dest.to_path_buf(), reference.to_string()));
        state
            .heads
            .insert(dest.to_path_buf(), reference.to_string());
        Ok(())
    }

    async fn head(&self, dest: &Path) -> Result<Option<CommitRef>, ToolError> {
        Ok(self.state().heads.get(dest).map(|h| commit(h)))
    }

    async fn remote_head(&self, url: &str, _branch: &str) -> Result<CommitRef, ToolError> {
        self.state()
            .remotes
            .get(url)
            .map(|h| commit(h))
            .ok_or_else(|| ToolError::failed(format!("git ls-remote {url}"), "repository not found"))
    }

    async fn resolve(
        &self,
        _dest: &Path,
        reference: &CommitRef,
    ) -> Result<Option<CommitRef>, ToolError> {
        let state = self.state();
        Ok(state
            .known_commits
            .contains(reference.as_str())
            .then(|| reference.clone()))
    }
}

#[async_trait]
impl CertificateAuthority for FakeHost {
    async fn obtain(&self, _domain: &str, _email: &str) -> Result<(), ToolError> {
        let delay = {
            let mut state = self.state();
            state.authority_calls.push("obtain");
            state.obtain_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.obtain_fails {
            return Err(ToolError::failed("certbot certonly", "challenge failed"));
        }
        state.expiry = Some(Utc::now() + chrono::Duration::days(90));
        Ok(())
    }

    async fn renew(&self, _domain: &str) -> Result<(), ToolError> {
        let mut state = self.state();
        state.authority_calls.push("renew");
        state.expiry = Some(Utc::now() + chrono::Duration::days(90));
        Ok(())
    }

    async fn current_expiry(&self, _domain: &str) -> Result<Option<DateTime<Utc>>, ToolError> {
        Ok(self.state().expiry)
    }

    fn certificate_path(&self, domain: &str) -> PathBuf {
        PathBuf::from("/etc/letsencrypt/live")
            .join(domain)
            .join("fullchain.pem")
    }
}

#[async_trait]
impl ReverseProxy for FakeHost {
    async fn stop(&self) -> Result<(), ToolError> {
        self.state().proxy_calls.push("stop");
        Ok(())
    }

    async fn start(&self) -> Result<(), ToolError> {
        let mut state = self.state();
        state.proxy_calls.push("start");
        if state.proxy_start_fails {
            return Err(ToolError::failed("docker compose start nginx", "port in use"));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), ToolError> {
        self.state().proxy_calls.push("reload");
        Ok(())
    }
}

#[async_trait]
impl Firewall for FakeHost {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), ToolError> {
        self.state().firewall_rules.push(rule.clone());
        Ok(())
    }

    async fn enable(&self) -> Result<(), ToolError> {
        self.state().firewall_enabled = true;
        Ok(())
    }

    async fn is_allowed(&self, rule: &FirewallRule) -> Result<bool, ToolError> {
        Ok(self.state().firewall_rules.contains(rule))
    }

    async fn is_enabled(&self) -> Result<bool, ToolError> {
        Ok(self.state().firewall_enabled)
    }
}

#[async_trait]
impl PackageManager for FakeHost {
    async fn is_installed(&self, name: &str) -> Result<bool, ToolError> {
        Ok(self.state().packages.contains(name))
    }

    async fn install(&self, name: &str) -> Result<(), ToolError> {
        self.state().packages.insert(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl Scheduler for FakeHost {
    async fn entries(&self) -> Result<Vec<String>, ToolError> {
        Ok(self.state().crontab.clone())
    }

    async fn install(&self, entry: &str, marker: &str) -> Result<(), ToolError> {
        let mut state = self.state();
        state.crontab.retain(|line| !line.contains(marker));
        state.crontab.push(entry.to_string());
        Ok(())
    }
}

#[async_trait]
impl HostProbe for FakeHost {
    async fn binary_on_path(&self, name: &str) -> bool {
        self.state().binaries.contains(name)
    }

    async fn file_exists(&self, path: &Path) -> bool {
        self.state().files.contains(path) || path.exists()
    }

    async fn is_root(&self) -> bool {
        self.state().root
    }

    async fn disk_usage_percent(&self, _path: &Path) -> Result<u8, ToolError> {
        Ok(self.state().disk_usage)
    }
}

pub const BACKEND_REPO: &str = "https://git.example.com/shop/backend.git";
pub const FRONTEND_REPO: &str = "https://git.example.com/shop/frontend.git";

/// A project directory with a compose file, its config, and a ready fake host.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub host: FakeHost,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_yaml("")
    }

    /// `extra` is appended to the base config.
    pub fn with_yaml(extra: &str) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();

        let yaml = format!(
            r#"
project: shop
base_dir: {base}
state_dir: {base}/state
runtime: docker
components:
  - name: backend
    repository: {BACKEND_REPO}
  - name: frontend
    repository: {FRONTEND_REPO}
health:
  timeout: 1s
  interval: 10ms
{extra}
"#,
            base = dir.path().display(),
        );
        let config = Config::from_yaml(&yaml).unwrap();

        let host = FakeHost::ready();
        host.publish(BACKEND_REPO, "aaaaaaaaaaaa1111");
        host.publish(FRONTEND_REPO, "ffffffffffff1111");

        Self { dir, config, host }
    }

    pub fn component_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
