//! Reconciliation configuration.
//!
//! Recognized options and their defaults:
//!
//! | Option                           | YAML field              | Default                |
//! |----------------------------------|-------------------------|------------------------|
//! | `reconcile.interval.seconds`     | `interval_seconds`      | 10                     |
//! | `reconcile.retry.count`          | `retry_count`           | 10                     |
//! | `reconcile.retry.interval.millis`| `retry_interval_millis` | 10000                  |
//! | `registry.root.path`             | `registry_root`         | `~/.steward/registry`  |
//!
//! `artefact_types` names the manifest-plugin instances the composition root
//! registers at startup, in priority order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::paths;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_RETRY_COUNT: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL_MILLIS: u64 = 10_000;

/// Configuration loaded from `~/.steward/config.yaml`. A missing file means
/// all defaults; unknown fields are rejected so typos surface early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Fixed pass interval for the scheduler loop.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// How many deferral attempts a dependency-blocked artefact gets before
    /// it fails.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Minimum spacing between counted deferral attempts.
    #[serde(default = "default_retry_interval_millis")]
    pub retry_interval_millis: u64,

    /// Content source root; defaults to `~/.steward/registry` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_root: Option<PathBuf>,

    /// Artefact type tags to register manifest plugins for, in priority
    /// order.
    #[serde(default = "default_artefact_types")]
    pub artefact_types: Vec<String>,
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_interval_millis() -> u64 {
    DEFAULT_RETRY_INTERVAL_MILLIS
}

fn default_artefact_types() -> Vec<String> {
    vec!["manifest".to_string()]
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_interval_millis: DEFAULT_RETRY_INTERVAL_MILLIS,
            registry_root: None,
            artefact_types: default_artefact_types(),
        }
    }
}

impl ReconcileConfig {
    /// Load the config under `home`, or defaults if no file exists yet.
    pub fn load_at(home: &Path) -> Result<Self, CoreError> {
        let path = paths::config_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
    }

    /// Atomically save the config under `home` (`.tmp` sibling + rename).
    pub fn save_at(&self, home: &Path) -> Result<(), CoreError> {
        let path = paths::config_path(home);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Effective content source root for this config.
    pub fn registry_root_at(&self, home: &Path) -> PathBuf {
        self.registry_root
            .clone()
            .unwrap_or_else(|| paths::default_registry_root(home))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_millis)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let home = TempDir::new().unwrap();
        let config = ReconcileConfig::load_at(home.path()).unwrap();
        assert_eq!(config, ReconcileConfig::default());
        assert_eq!(config.interval_seconds, 10);
        assert_eq!(config.retry_count, 10);
        assert_eq!(config.retry_interval_millis, 10_000);
        assert_eq!(config.artefact_types, vec!["manifest".to_string()]);
    }

    #[test]
    fn save_load_roundtrip() {
        let home = TempDir::new().unwrap();
        let config = ReconcileConfig {
            interval_seconds: 5,
            retry_count: 3,
            retry_interval_millis: 250,
            registry_root: Some(PathBuf::from("/srv/registry")),
            artefact_types: vec!["proxy".into(), "job".into()],
        };
        config.save_at(home.path()).unwrap();
        let loaded = ReconcileConfig::load_at(home.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_cleans_up_tmp() {
        let home = TempDir::new().unwrap();
        ReconcileConfig::default().save_at(home.path()).unwrap();
        let tmp = paths::config_path(home.path()).with_extension("yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let home = TempDir::new().unwrap();
        let dir = paths::steward_root(home.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(paths::config_path(home.path()), "interval_seconds: 2\n").unwrap();

        let config = ReconcileConfig::load_at(home.path()).unwrap();
        assert_eq!(config.interval_seconds, 2);
        assert_eq!(config.retry_count, DEFAULT_RETRY_COUNT);
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let home = TempDir::new().unwrap();
        let dir = paths::steward_root(home.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(paths::config_path(home.path()), "retyr_count: 3\n").unwrap();

        let err = ReconcileConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn registry_root_defaults_under_home() {
        let home = TempDir::new().unwrap();
        let config = ReconcileConfig::default();
        assert_eq!(
            config.registry_root_at(home.path()),
            home.path().join(".steward").join("registry")
        );
    }
}
