// ABOUTME: Entry point for the deckhand CLI application.
// ABOUTME: Parses arguments, installs the abort handler, and maps results to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{Host, RollbackArgs, RunOptions};
use deckhand::deploy::AbortHandle;
use deckhand::error::{Error, ExitStatus, Result};
use deckhand::output::{Output, OutputMode};
use deckhand::plan::CertTarget;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    let abort = AbortHandle::new();
    let signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("abort requested; stopping after the current step");
            signal.abort();
        }
    });

    let status = match run(cli, abort, &mut output).await {
        Ok(status) => status,
        Err(e) => {
            report_error(&e, &output);
            e.exit_status()
        }
    };

    std::process::exit(status.code());
}

fn report_error(error: &Error, output: &Output) {
    output.error(&error.to_string());
    if let Error::Deploy(deploy) = error
        && output.mode() != OutputMode::Json
    {
        if let Some(diagnostic) = deploy.diagnostic() {
            eprintln!("{diagnostic}");
        }
        eprintln!("Remediation: {}", deploy.remediation());
    }
}

async fn run(cli: Cli, abort: AbortHandle, output: &mut Output) -> Result<ExitStatus> {
    let options = RunOptions {
        force: cli.force,
        rollback: true,
        abort,
    };

    match cli.command {
        Commands::Init { project } => commands::init(project.as_deref(), cli.force, output),
        Commands::Provision => {
            let host = Host::open(cli.config.as_deref())?;
            commands::provision(&host, &options, output).await
        }
        Commands::Deploy {
            profile,
            no_rollback,
        } => {
            let host = Host::open(cli.config.as_deref())?;
            let options = RunOptions {
                rollback: !no_rollback,
                ..options
            };
            commands::deploy(&host, profile.as_deref(), &options, output).await
        }
        Commands::Rollback {
            to,
            component,
            profile,
            yes,
        } => {
            let host = Host::open(cli.config.as_deref())?;
            let args = RollbackArgs {
                to,
                component,
                profile,
                yes,
                force: cli.force,
            };
            commands::rollback(&host, args, output).await
        }
        Commands::SslSetup { domain, email } => {
            let host = Host::open(cli.config.as_deref())?;
            commands::ssl_setup(&host, &domain, &email, &options, output).await
        }
        Commands::RenewCerts { domain, email } => {
            let host = Host::open(cli.config.as_deref())?;
            let target = domain.zip(email).map(|(domain, email)| CertTarget::new(domain, email));
            commands::renew_certs(&host, target, &options, output).await
        }
        Commands::Status => {
            let host = Host::open(cli.config.as_deref())?;
            commands::status(&host, output).await
        }
    }
}
