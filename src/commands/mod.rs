// ABOUTME: Command module aggregator for the deckhand CLI.
// ABOUTME: Loads config and collaborators once and runs plans under the orchestrator.

mod deploy;
mod init;
mod provision;
mod rollback;
mod ssl;
mod status;

pub use deploy::deploy;
pub use init::init;
pub use provision::provision;
pub use rollback::{RollbackArgs, rollback};
pub use ssl::{renew_certs, ssl_setup};
pub use status::status;

use deckhand::config::Config;
use deckhand::deploy::{AbortHandle, Orchestrator};
use deckhand::error::{ExitStatus, Result};
use deckhand::output::Output;
use deckhand::plan::{DeploymentPlan, PlanInputs};
use deckhand::tools::{RuntimeType, Toolbox, detect_local};
use std::env;
use std::path::{Path, PathBuf};

/// Loaded configuration plus the collaborators for this host.
pub struct Host {
    pub config: Config,
    pub config_path: PathBuf,
    pub runtime: RuntimeType,
    pub tools: Toolbox,
}

impl Host {
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Config::locate(&env::current_dir()?)?,
        };
        let config = Config::load(&config_path)?;
        let runtime = detect_local(config.runtime);
        let tools = Toolbox::local(&config, runtime);
        tracing::debug!(config = %config_path.display(), %runtime, "host opened");

        Ok(Self {
            config,
            config_path,
            runtime,
            tools,
        })
    }

    pub fn plan_inputs(&self) -> PlanInputs<'_> {
        PlanInputs::new(&self.config, self.runtime, self.renew_command())
    }

    /// Command line the renewal schedule runs.
    fn renew_command(&self) -> String {
        let exe = env::current_exe().unwrap_or_else(|_| PathBuf::from("deckhand"));
        let config = std::path::absolute(&self.config_path).unwrap_or_else(|_| self.config_path.clone());
        format!("{} --config {} renew-certs", exe.display(), config.display())
    }
}

/// Flags shared by every plan-running command.
#[derive(Clone)]
pub struct RunOptions {
    pub force: bool,
    pub rollback: bool,
    pub abort: AbortHandle,
}

async fn run_plan(
    host: &Host,
    command: &str,
    profile: Option<&str>,
    plan: &DeploymentPlan,
    options: &RunOptions,
    output: &mut Output,
) -> Result<ExitStatus> {
    output.start_timer();
    output.progress(&format!(
        "Running {command} for {} ({} steps)",
        host.config.project,
        plan.len()
    ));

    let report = Orchestrator::new(&host.config, host.tools.clone())
        .with_abort(options.abort.clone())
        .force_lock(options.force)
        .rollback_on_failure(options.rollback)
        .run(command, profile, plan)
        .await?;

    output.report(&report);
    Ok(report.exit_status())
}
