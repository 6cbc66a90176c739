// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Hardened single-host deployment of container stacks")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output (for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output JSON lines (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Break a run lock held by another run; with init, overwrite an existing file
    #[arg(long, global = true)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new deckhand.yml configuration file
    Init {
        /// Project name
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Prepare the host: packages, firewall, network, environment, checkouts
    Provision,

    /// Sync components and bring the stack up
    Deploy {
        /// Deployment profile (defined in config)
        #[arg(short, long)]
        profile: Option<String>,

        /// Report failures without rolling back
        #[arg(long)]
        no_rollback: bool,
    },

    /// Restore components to an earlier revision
    Rollback {
        /// Commit, tag, or branch to roll back to (default: previous revision)
        #[arg(long)]
        to: Option<String>,

        /// Roll back a single component
        #[arg(long, requires = "to")]
        component: Option<String>,

        /// Deployment profile to rebuild (defined in config)
        #[arg(short, long)]
        profile: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Issue a certificate and install the renewal schedule
    SslSetup {
        /// Domain to certify
        domain: String,

        /// Contact email for the certificate authority
        email: String,
    },

    /// Renew the certificate if it is inside the renewal window
    RenewCerts {
        /// Domain (default: tls.domain from config)
        #[arg(long, requires = "email")]
        domain: Option<String>,

        /// Contact email (default: tls.email from config)
        #[arg(long, requires = "domain")]
        email: Option<String>,
    },

    /// Show the last run, active revisions, and containers
    Status,
}
