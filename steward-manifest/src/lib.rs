//! # steward-manifest
//!
//! The concrete artefact plugin shipped with steward: YAML manifest
//! definitions in the registry tree, deployed as JSON files under
//! `~/.steward/deploy/<tag>/`, with state tracked per type in
//! `~/.steward/state/<tag>.json`.

use std::path::Path;
use std::sync::Arc;

use steward_core::config::ReconcileConfig;
use steward_core::plugin::PluginRegistry;

pub mod manifest;
pub mod plugin;
pub mod store;

pub use manifest::{parse_manifest, ManifestDoc};
pub use plugin::ManifestPlugin;
pub use store::JsonFileStore;

/// Build the registry the daemon and CLI both run with: one manifest plugin
/// per configured artefact type, priority following configuration order.
pub fn default_registry_at(home: &Path, config: &ReconcileConfig) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for (i, tag) in config.artefact_types.iter().enumerate() {
        registry.register(i as i32 * 10, Arc::new(ManifestPlugin::new_at(home, tag)));
    }
    registry
}
