//! Steward — declarative artefact reconciliation CLI.
//!
//! # Usage
//!
//! ```text
//! steward init
//! steward run [--json]
//! steward status [--type <tag>] [--json]
//! steward daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, init::InitArgs, run::RunArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "steward",
    version,
    about = "Reconcile declarative artefact definitions against their deployed state",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the steward home layout and a default configuration.
    Init(InitArgs),

    /// Run one reconciliation pass (through the daemon when it is running).
    Run(RunArgs),

    /// Show the lifecycle state of every tracked artefact.
    Status(StatusArgs),

    /// Manage the background reconciliation daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
