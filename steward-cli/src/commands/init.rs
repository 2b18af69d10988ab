//! `steward init` — create the home layout and a default configuration.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use steward_core::config::ReconcileConfig;
use steward_core::paths;

/// Arguments for `steward init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration with defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let config_path = paths::config_path(&home);
        let existing = config_path.exists();
        if existing && !self.force {
            println!("configuration already exists: {}", config_path.display());
        } else {
            ReconcileConfig::default()
                .save_at(&home)
                .context("failed to write default configuration")?;
            println!("wrote configuration: {}", config_path.display());
        }

        let config = ReconcileConfig::load_at(&home).context("failed to load configuration")?;
        let registry_root = config.registry_root_at(&home);
        for dir in [
            registry_root.clone(),
            paths::state_dir(&home),
            paths::deploy_dir(&home),
            paths::run_dir(&home),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        println!("registry root: {}", registry_root.display());
        println!(
            "artefact types: {}",
            config.artefact_types.join(", ")
        );
        println!("Drop definition files under the registry root and run `steward run`.");
        Ok(())
    }
}
