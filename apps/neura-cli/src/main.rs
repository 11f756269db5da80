//! # neura-cli
//!
//! Operator tool for Neura's action-authorization pipeline:
//! - `neura init`: write the default config and rule set under `.neura/`
//! - `neura policy check/show`: dry-run policy evaluation, print rules
//! - `neura audit verify/search/export/stats/tail`: inspect the journal
//! - `neura run`: send one action through the pipeline with a terminal
//!   confirmation prompt

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use neura_pipeline::NeuraConfig;
use tracing_subscriber::EnvFilter;

/// Neura: authorize, execute and audit assistant actions.
#[derive(Parser)]
#[command(name = "neura", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and rule set under .neura/.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Evaluate requests against the rule set.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Inspect the action journal.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Run one action through the pipeline.
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("neura_pipeline=info".parse()?)
                .add_directive("neura_motor=info".parse()?)
                .add_directive("neura_audit=info".parse()?)
                .add_directive("neura=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);

    match &cli.command {
        Commands::Init { force } => commands::init::execute(&project_root, *force),
        Commands::Policy { command } => {
            let config = NeuraConfig::load_or_default(&project_root)?;
            commands::policy::execute(command, &config)
        }
        Commands::Audit { command } => {
            let config = NeuraConfig::load_or_default(&project_root)?;
            commands::audit::execute(command, &config)
        }
        Commands::Run(args) => {
            let config = NeuraConfig::load_or_default(&project_root)?;
            commands::run::execute(args, config).await
        }
    }
}
