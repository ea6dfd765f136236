//! # cov
//!
//! Command-line interface for Covenant.
//!
//! - `cov identity ensure/rotate/show`: manage the signing identity
//! - `cov manifest create/validate`: issue and check execution manifests
//! - `cov policy evaluate`: run the autonomy policy against a manifest
//! - `cov ledger record/verify/tail`: append to and inspect the audit ledger
//!
//! Rejected manifests, rejected actions and broken chains exit non-zero.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::CovenantConfig;

/// Covenant: signed authorization and audit for autonomous actions.
#[derive(Parser)]
#[command(name = "cov", version, about)]
struct Cli {
    /// State directory (defaults to ~/.covenant).
    #[arg(long, env = "COVENANT_HOME")]
    home: Option<PathBuf>,

    /// Emit logs as JSON lines instead of plain text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the signing identity.
    Identity {
        #[command(subcommand)]
        command: commands::identity::IdentityCommands,
    },
    /// Issue and validate execution manifests.
    Manifest {
        #[command(subcommand)]
        command: commands::manifest::ManifestCommands,
    },
    /// Evaluate the autonomy policy.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Record to and inspect the audit ledger.
    Ledger {
        #[command(subcommand)]
        command: commands::ledger::LedgerCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let home = cli.home.unwrap_or_else(CovenantConfig::default_home);
    let config = CovenantConfig::for_home(&home);

    match &cli.command {
        Commands::Identity { command } => commands::identity::execute(command, &config),
        Commands::Manifest { command } => commands::manifest::execute(command, &config),
        Commands::Policy { command } => commands::policy::execute(command, &config),
        Commands::Ledger { command } => commands::ledger::execute(command, &config),
    }
}

/// Logs go to stderr so stdout stays clean for JSON output.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("cov=info".parse()?)
        .add_directive("cov_identity=info".parse()?)
        .add_directive("cov_manifest=info".parse()?)
        .add_directive("cov_policy=info".parse()?)
        .add_directive("cov_audit=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
