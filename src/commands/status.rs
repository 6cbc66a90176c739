// ABOUTME: Status command implementation.
// ABOUTME: Shows the last recorded run, active revisions, and container state.

use super::Host;
use deckhand::deploy::RevisionHistory;
use deckhand::error::{ExitStatus, Result};
use deckhand::output::{Output, OutputMode};
use deckhand::plan::{ReportLog, RunReport};
use deckhand::tools::ContainerStatus;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct StatusView<'a> {
    project: &'a str,
    last_run: Option<&'a RunReport>,
    active: BTreeMap<String, Option<String>>,
    containers: &'a [ContainerStatus],
}

pub async fn status(host: &Host, output: &Output) -> Result<ExitStatus> {
    let config = &host.config;
    let last_run = ReportLog::new(config.report_log_path()).last()?;
    let history = RevisionHistory::load(config.history_path())?;

    let active: BTreeMap<String, Option<String>> = config
        .components
        .iter()
        .map(|c| {
            let commit = history.active(&c.name).map(|r| r.to_string());
            (c.name.to_string(), commit)
        })
        .collect();

    let containers = match host.tools.runtime.ps(&config.default_compose_spec()).await {
        Ok(containers) => containers,
        Err(e) => {
            output.warning(&format!("could not list containers: {e}"));
            Vec::new()
        }
    };

    if output.mode() == OutputMode::Json {
        let view = StatusView {
            project: config.project.as_str(),
            last_run: last_run.as_ref(),
            active,
            containers: &containers,
        };
        println!("{}", serde_json::to_string(&view)?);
        return Ok(ExitStatus::Success);
    }

    println!("Project: {}", config.project);
    match &last_run {
        Some(run) => println!(
            "Last run: {} {} at {} ({:?})",
            run.command,
            run.run_id,
            run.finished_at.unwrap_or(run.started_at).to_rfc3339(),
            run.status
        ),
        None => println!("Last run: none recorded"),
    }

    println!("Revisions:");
    for (component, commit) in &active {
        println!("  {component}: {}", commit.as_deref().unwrap_or("not deployed"));
    }

    println!("Containers:");
    if containers.is_empty() {
        println!("  none running");
    }
    for container in &containers {
        println!("  {} ({}): {}", container.name, container.service, container.state);
    }

    Ok(ExitStatus::Success)
}
