//! `steward status` — lifecycle visibility across tracked artefacts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use steward_core::config::ReconcileConfig;
use steward_core::types::{Artefact, Lifecycle};
use steward_manifest::default_registry_at;

/// Arguments for `steward status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter to one artefact type tag.
    #[arg(long = "type")]
    pub type_tag: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    artefacts: Vec<Artefact>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    artefacts: usize,
    failed: usize,
    deferred_or_pending: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "type")]
    artefact_type: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "updated")]
    updated: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let config = ReconcileConfig::load_at(&home).context("failed to load configuration")?;
        let registry = default_registry_at(&home, &config);

        let mut artefacts: Vec<Artefact> = Vec::new();
        for plugin in registry.iter() {
            if let Some(filter) = self.type_tag.as_deref() {
                if plugin.type_tag() != filter {
                    continue;
                }
            }
            let mut listed = plugin
                .retrieve()
                .with_context(|| format!("failed to load state for '{}'", plugin.type_tag()))?;
            listed.sort_by(|a, b| a.display_name().cmp(b.display_name()));
            artefacts.extend(listed);
        }

        if self.json {
            print_json(artefacts)?;
        } else {
            print_table(artefacts);
        }
        Ok(())
    }
}

fn print_json(artefacts: Vec<Artefact>) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            artefacts: artefacts.len(),
            failed: artefacts
                .iter()
                .filter(|a| a.lifecycle == Lifecycle::Failed)
                .count(),
            deferred_or_pending: artefacts
                .iter()
                .filter(|a| matches!(a.lifecycle, Lifecycle::New | Lifecycle::Modified))
                .count(),
        },
        artefacts,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(artefacts: Vec<Artefact>) {
    let failed = artefacts
        .iter()
        .filter(|a| a.lifecycle == Lifecycle::Failed)
        .count();
    println!(
        "Steward v{} | {} artefacts | {} failed",
        env!("CARGO_PKG_VERSION"),
        artefacts.len(),
        failed,
    );

    if artefacts.is_empty() {
        println!("No artefacts tracked. Drop definitions in the registry and run `steward run`.");
        return;
    }

    let rows: Vec<StatusTableRow> = artefacts
        .into_iter()
        .map(|artefact| StatusTableRow {
            artefact_type: artefact.artefact_type.to_string(),
            name: artefact.display_name().to_string(),
            state: lifecycle_label(artefact.lifecycle),
            updated: format_age(artefact.updated_at),
            detail: artefact.error.unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if failed > 0 {
        println!(
            "{}",
            "Some artefacts failed; fix their definitions and re-run.".red()
        );
    }
}

fn lifecycle_label(lifecycle: Lifecycle) -> String {
    match lifecycle {
        Lifecycle::New => "NEW".bright_black().to_string(),
        Lifecycle::Created => "CREATED".green().to_string(),
        Lifecycle::Modified => "MODIFIED".yellow().to_string(),
        Lifecycle::Updated => "UPDATED".green().to_string(),
        Lifecycle::Failed => "FAILED".red().bold().to_string(),
        Lifecycle::Deleted => "DELETED".bright_black().to_string(),
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let delta = Utc::now().signed_duration_since(at);
    let seconds = delta.num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }
    match seconds {
        0..=59 => format!("{seconds}s ago"),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(5)), "5s ago");
        assert_eq!(format_age(now - Duration::minutes(3)), "3m ago");
        assert_eq!(format_age(now - Duration::hours(7)), "7h ago");
        assert_eq!(format_age(now - Duration::days(2)), "2d ago");
        assert_eq!(format_age(now + Duration::seconds(30)), "just now");
    }
}
