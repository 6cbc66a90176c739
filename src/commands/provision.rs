// ABOUTME: Provision command implementation.
// ABOUTME: Prepares the host so a deploy can run: packages, firewall, network, checkouts.

use super::{Host, RunOptions, run_plan};
use deckhand::error::{ExitStatus, Result};
use deckhand::output::Output;
use deckhand::plan::provision_plan;

pub async fn provision(host: &Host, options: &RunOptions, output: &mut Output) -> Result<ExitStatus> {
    let plan = provision_plan(&host.plan_inputs())?;
    run_plan(host, "provision", None, &plan, options, output).await
}
