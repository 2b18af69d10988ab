//! # steward-core
//!
//! Domain types and contracts for the Steward reconciliation engine:
//! artefact model and lifecycle states, the plugin contract and priority
//! registry, the content-source abstraction, per-plugin persistence, paths
//! and configuration.

pub mod config;
pub mod error;
pub mod paths;
pub mod plugin;
pub mod source;
pub mod store;
pub mod types;

pub use config::ReconcileConfig;
pub use error::CoreError;
pub use plugin::{ApplyOutcome, ArtefactPlugin, ParseError, PluginError, PluginRegistry};
pub use source::{ContentSource, FsContentSource};
pub use store::{ArtefactStore, MemoryStore};
pub use types::{Artefact, ArtefactKey, ArtefactPhase, ArtefactType, Lifecycle, Location};
