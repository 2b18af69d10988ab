//! `steward run` — one reconciliation pass.
//!
//! When the daemon is up the pass is delegated to it over the socket, so
//! scheduled and manual passes share one queue and one deferral budget.
//! Without a daemon the pass runs in-process.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use steward_core::config::ReconcileConfig;
use steward_core::paths;
use steward_core::source::FsContentSource;
use steward_daemon::{request_run, DaemonError};
use steward_engine::{run_pass, DeferralBook, PassOutcome, PassReport, TracingRecorder};
use steward_manifest::default_registry_at;

/// Arguments for `steward run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Emit the full pass report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let report = match request_run(&home) {
            Ok(report) => report,
            Err(DaemonError::DaemonNotRunning { .. }) => run_local(&home)?,
            Err(err) => return Err(err).context("daemon pass failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to render pass report JSON")?
            );
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn run_local(home: &Path) -> Result<PassReport> {
    let config = ReconcileConfig::load_at(home).context("failed to load configuration")?;
    let registry_root = config.registry_root_at(home);
    for dir in [
        registry_root.clone(),
        paths::state_dir(home),
        paths::deploy_dir(home),
    ] {
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let registry = default_registry_at(home, &config);
    let source = FsContentSource::new(&registry_root);
    let mut book = DeferralBook::new();
    let mut recorder = TracingRecorder;

    run_pass(&registry, &source, &config, &mut book, &mut recorder)
        .context("reconciliation pass failed")
}

fn print_report(report: &PassReport) {
    for transition in &report.transitions {
        let label = outcome_label(transition.outcome);
        let name = transition
            .name
            .as_deref()
            .unwrap_or(transition.location.as_str());
        match &transition.error {
            Some(error) => println!("{label} {}/{name}: {error}", transition.artefact_type),
            None => println!("{label} {}/{name}", transition.artefact_type),
        }
    }

    println!(
        "{} processed | {} created | {} updated | {} unchanged | {} deleted | {} failed | {} deferred",
        report.processed,
        report.created,
        report.updated,
        report.unchanged,
        report.deleted,
        report.failed,
        report.deferred,
    );
    if report.failed > 0 {
        println!("{}", "Some artefacts failed; see `steward status`.".red());
    } else if report.deferred > 0 {
        println!("Deferred artefacts retry on the next pass.");
    }
}

fn outcome_label(outcome: PassOutcome) -> String {
    match outcome {
        PassOutcome::Created => "  created".green().to_string(),
        PassOutcome::Updated => "  updated".green().to_string(),
        PassOutcome::Unchanged => "unchanged".to_string(),
        PassOutcome::Deleted => "  deleted".cyan().to_string(),
        PassOutcome::Failed => "   failed".red().bold().to_string(),
        PassOutcome::Deferred => " deferred".yellow().to_string(),
    }
}
