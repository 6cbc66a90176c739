// ABOUTME: Idempotent action runner: predicate, act, re-check.
// ABOUTME: Turns each plan step into an immutable outcome without ever silently continuing.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::plan::{Action, EnvEntries, Step, StepOutcome, StepStatus};
use crate::preflight::{self, PreflightReport};
use crate::tools::{ComposeSpec, PullOutcome, ToolError, Toolbox};

/// One retry after the first attempt.
const MAX_ATTEMPTS: usize = 2;

/// Facts earlier steps of the same run established.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunContext {
    /// A sync step pulled new code; containers must be rebuilt.
    pub code_changed: bool,
}

pub struct ActionRunner {
    tools: Toolbox,
}

impl ActionRunner {
    pub fn new(tools: Toolbox) -> Self {
        Self { tools }
    }

    pub async fn apply(&self, step: &Step, ctx: &RunContext) -> StepOutcome {
        let outcome = self.converge(step, ctx).await;
        info!(step = %step.name, kind = %step.kind, status = %outcome.status, "step finished");
        outcome
    }

    async fn converge(&self, step: &Step, ctx: &RunContext) -> StepOutcome {
        let action = &step.action;

        if let Action::ReconcileCertificate { .. } = action {
            return StepOutcome::new(
                step,
                StepStatus::Failed("certificate steps run through the certificate manager".into()),
            );
        }

        match self.holds(action, ctx, false).await {
            Ok(true) => return StepOutcome::new(step, StepStatus::Satisfied),
            Ok(false) => {}
            Err(e) => {
                return StepOutcome::new(step, StepStatus::Failed("could not observe state".into()))
                    .with_detail(e.to_string());
            }
        }

        if action.is_read_only() {
            let reason = self.unmet(action).await;
            return StepOutcome::new(step, StepStatus::Failed(reason));
        }

        let mut detail: Option<String> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            debug!(step = %step.name, attempt, "{action}");

            if let Err(e) = self.act(action).await {
                warn!(step = %step.name, attempt, "action failed: {e}");
                detail = Some(e.to_string());
            }

            match self.holds(action, ctx, true).await {
                Ok(true) => return StepOutcome::new(step, StepStatus::Applied),
                Ok(false) => {}
                Err(e) => detail = Some(e.to_string()),
            }
        }

        let outcome = StepOutcome::new(
            step,
            StepStatus::Failed(format!(
                "{action}: end state not reached after {MAX_ATTEMPTS} attempts"
            )),
        );
        match detail {
            Some(detail) => outcome.with_detail(detail),
            None => outcome,
        }
    }

    /// The side-effect-free predicate. `after_act` relaxes checks whose
    /// end state settles later (container start is awaited by the health step).
    async fn holds(
        &self,
        action: &Action,
        ctx: &RunContext,
        after_act: bool,
    ) -> Result<bool, ToolError> {
        let tools = &self.tools;
        match action {
            Action::CheckCapabilities(required) => {
                let report = preflight::check(tools.host.as_ref(), required).await;
                Ok(report.is_satisfied())
            }
            Action::InstallPackage { name } => tools.packages.is_installed(name).await,
            Action::AllowFirewall { rule } => tools.firewall.is_allowed(rule).await,
            Action::EnableFirewall => tools.firewall.is_enabled().await,
            Action::CreateNetwork { name } => tools.runtime.network_exists(name).await,
            Action::SyncRepository {
                url, branch, dest, ..
            } => match tools.vcs.head(dest).await? {
                None => Ok(false),
                Some(head) => Ok(head == tools.vcs.remote_head(url, branch).await?),
            },
            Action::CheckoutRevision {
                dest, reference, ..
            } => {
                let Some(head) = tools.vcs.head(dest).await? else {
                    return Ok(false);
                };
                Ok(tools.vcs.resolve(dest, reference).await? == Some(head))
            }
            Action::WriteEnvFile { path, entries } => env_file_matches(path, entries).await,
            Action::VerifyFiles { paths } => {
                for path in paths {
                    if !tools.host.file_exists(path).await {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Action::ContainersUp { compose, expected } => {
                if ctx.code_changed && !after_act {
                    return Ok(false);
                }
                let listed = tools.runtime.ps(compose).await?;
                let count = if after_act {
                    listed.len()
                } else {
                    listed.iter().filter(|c| c.is_running()).count()
                };
                Ok(count >= *expected)
            }
            Action::ContainersDown { compose } => Ok(tools.runtime.ps(compose).await?.is_empty()),
            Action::WaitHealthy {
                compose, expected, ..
            } => Ok(running(tools, compose).await? >= *expected),
            Action::PruneImages => Ok(tools.runtime.dangling_images().await? == 0),
            Action::InstallSchedule { entry, .. } => Ok(tools
                .scheduler
                .entries()
                .await?
                .iter()
                .any(|line| line.trim() == entry.trim())),
            Action::ReconcileCertificate { target } => Ok(target.is_none()),
        }
    }

    async fn act(&self, action: &Action) -> Result<(), ToolError> {
        let tools = &self.tools;
        match action {
            Action::InstallPackage { name } => tools.packages.install(name).await,
            Action::AllowFirewall { rule } => tools.firewall.allow(rule).await,
            Action::EnableFirewall => tools.firewall.enable().await,
            Action::CreateNetwork { name } => tools.runtime.create_network(name).await,
            Action::SyncRepository {
                url, branch, dest, ..
            } => {
                if tools.vcs.head(dest).await?.is_none() {
                    return tools.vcs.clone_repo(url, dest, branch).await;
                }
                match tools.vcs.pull(dest, branch).await? {
                    PullOutcome::Updated | PullOutcome::UpToDate => Ok(()),
                    PullOutcome::Conflict => Err(ToolError::failed(
                        format!("git pull origin {branch}"),
                        format!(
                            "{} has diverged from origin/{branch}; resolve it with `git status` in that directory",
                            dest.display()
                        ),
                    )),
                }
            }
            Action::CheckoutRevision {
                dest, reference, ..
            } => tools.vcs.checkout(dest, reference).await,
            Action::WriteEnvFile { path, entries } => write_env_file(path, entries).await,
            Action::ContainersUp { compose, .. } => tools.runtime.up(compose).await.map(|_| ()),
            Action::ContainersDown { compose } => tools.runtime.down(compose).await,
            Action::PruneImages => tools.runtime.prune(false).await,
            Action::InstallSchedule { entry, marker } => {
                tools.scheduler.install(entry, marker).await
            }
            Action::CheckCapabilities(_)
            | Action::VerifyFiles { .. }
            | Action::WaitHealthy { .. }
            | Action::ReconcileCertificate { .. } => Ok(()),
        }
    }

    /// Human-readable gap for a read-only action that does not hold.
    async fn unmet(&self, action: &Action) -> String {
        let tools = &self.tools;
        match action {
            Action::CheckCapabilities(required) => {
                match preflight::check(tools.host.as_ref(), required).await {
                    PreflightReport::Missing(missing) => preflight::describe_missing(&missing),
                    PreflightReport::AllSatisfied => "capabilities changed while checking".into(),
                }
            }
            Action::VerifyFiles { paths } => {
                let mut missing = Vec::new();
                for path in paths {
                    if !tools.host.file_exists(path).await {
                        missing.push(path.display().to_string());
                    }
                }
                format!("missing files: {}", missing.join(", "))
            }
            Action::WaitHealthy {
                compose, expected, ..
            } => match running(tools, compose).await {
                Ok(count) => format!("{count} of {expected} containers running"),
                Err(e) => e.to_string(),
            },
            other => format!("{other} does not hold"),
        }
    }
}

async fn running(tools: &Toolbox, compose: &ComposeSpec) -> Result<usize, ToolError> {
    Ok(tools
        .runtime
        .ps(compose)
        .await?
        .iter()
        .filter(|c| c.is_running())
        .count())
}

async fn env_file_matches(path: &Path, entries: &EnvEntries) -> Result<bool, ToolError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content == entries.render()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ToolError::File {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Owner-only permissions; the file carries secrets.
async fn write_env_file(path: &Path, entries: &EnvEntries) -> Result<(), ToolError> {
    use tokio::io::AsyncWriteExt;

    let file_error = |source| ToolError::File {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(file_error)?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(file_error)?;
    file.write_all(entries.render().as_bytes())
        .await
        .map_err(file_error)?;
    file.flush().await.map_err(file_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(file_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entries() -> EnvEntries {
        EnvEntries::new(BTreeMap::from([
            ("API_KEY".to_string(), "s3cret".to_string()),
            ("PORT".to_string(), "8080".to_string()),
        ]))
    }

    #[tokio::test]
    async fn env_file_round_trip_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/.env");

        assert!(!env_file_matches(&path, &entries()).await.unwrap());
        write_env_file(&path, &entries()).await.unwrap();
        assert!(env_file_matches(&path, &entries()).await.unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn changed_entries_do_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        write_env_file(&path, &entries()).await.unwrap();

        let changed = EnvEntries::new(BTreeMap::from([("PORT".to_string(), "9090".to_string())]));
        assert!(!env_file_matches(&path, &changed).await.unwrap());
    }
}
