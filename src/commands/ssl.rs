// ABOUTME: Certificate command implementations.
// ABOUTME: ssl-setup issues and schedules renewal; renew-certs renews inside the window.

use super::{Host, RunOptions, run_plan};
use deckhand::error::{ExitStatus, Result};
use deckhand::output::Output;
use deckhand::plan::{CertTarget, renew_plan, ssl_setup_plan};

pub async fn ssl_setup(
    host: &Host,
    domain: &str,
    email: &str,
    options: &RunOptions,
    output: &mut Output,
) -> Result<ExitStatus> {
    let plan = ssl_setup_plan(&host.plan_inputs(), CertTarget::new(domain, email))?;
    run_plan(host, "ssl-setup", None, &plan, options, output).await
}

/// Runs unattended from the renewal schedule as well as by hand.
pub async fn renew_certs(
    host: &Host,
    target: Option<CertTarget>,
    options: &RunOptions,
    output: &mut Output,
) -> Result<ExitStatus> {
    let plan = renew_plan(&host.plan_inputs(), target)?;
    run_plan(host, "renew-certs", None, &plan, options, output).await
}
