// ABOUTME: Deploy command implementation.
// ABOUTME: Builds the deploy plan for a profile and runs it under the orchestrator.

use super::{Host, RunOptions, run_plan};
use deckhand::error::{ExitStatus, Result};
use deckhand::output::Output;
use deckhand::plan::deploy_plan;

pub async fn deploy(
    host: &Host,
    profile: Option<&str>,
    options: &RunOptions,
    output: &mut Output,
) -> Result<ExitStatus> {
    let (name, profile) = host.config.profile(profile)?;
    let plan = deploy_plan(&host.plan_inputs(), profile)?;
    run_plan(host, "deploy", Some(name), &plan, options, output).await
}
