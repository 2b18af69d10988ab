//! Artefact plugin contract and priority registry.
//!
//! One [`ArtefactPlugin`] implementation exists per artefact type. Plugins
//! are registered with an explicit integer priority (lower processed first)
//! in a [`PluginRegistry`] built once by the composition root and passed by
//! reference — there is no process-wide singleton and no by-name reflection:
//! consumers resolve a plugin through [`PluginRegistry::resolve`], which
//! returns a checked "unknown type" error rather than a silent null.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::error::CoreError;
use crate::types::{Artefact, ArtefactPhase, ArtefactType, Location};

// ---------------------------------------------------------------------------
// Plugin outcomes and errors
// ---------------------------------------------------------------------------

/// Result of a plugin `apply` call. Expected failures are modelled as
/// [`ApplyOutcome::Rejected`] values, never as panics, so the engine can
/// record the artefact as failed and continue the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Rejected { message: String },
}

impl ApplyOutcome {
    pub fn rejected(message: impl Into<String>) -> Self {
        ApplyOutcome::Rejected {
            message: message.into(),
        }
    }
}

/// A malformed artefact definition. Scoped to the one location that failed;
/// never aborts a pass.
#[derive(Debug, Error)]
#[error("malformed artefact definition at {location}: {message}")]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl ParseError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// Errors from plugin persistence and cleanup calls.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

/// Convenience constructor for [`PluginError::Io`].
pub fn plugin_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PluginError {
    PluginError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Plugin contract
// ---------------------------------------------------------------------------

/// Per-artefact-type implementation of parse / apply / cleanup, plus the
/// persistence hooks the engine drives after each lifecycle transition.
pub trait ArtefactPlugin: Send + Sync {
    /// The type tag this plugin owns.
    fn type_tag(&self) -> &str;

    /// Whether this plugin owns `artefact_type`.
    fn accepts(&self, artefact_type: &ArtefactType) -> bool {
        artefact_type.as_str() == self.type_tag()
    }

    /// Parse raw definition bytes into candidate artefacts. Must be pure and
    /// deterministic for identical bytes.
    fn parse(&self, location: &Location, bytes: &[u8]) -> Result<Vec<Artefact>, ParseError>;

    /// Previously persisted instances of this type, used to detect artefacts
    /// removed from the content source.
    fn retrieve(&self) -> Result<Vec<Artefact>, PluginError>;

    /// Perform the artefact's side effect for `phase`. Must be idempotent
    /// under repeated `Create`/`Update` with identical content.
    fn apply(&self, artefact: &Artefact, phase: ArtefactPhase) -> ApplyOutcome;

    /// Perform deletion side effects. Errors are caught by the engine and
    /// recorded as a pending deletion; the artefact is never silently
    /// dropped from persistence without confirmed cleanup.
    fn cleanup(&self, artefact: &Artefact) -> Result<(), PluginError>;

    /// Save the artefact's current state to this plugin's store.
    fn persist(&self, artefact: &Artefact) -> Result<(), PluginError>;

    /// Remove the artefact's record from this plugin's store.
    fn remove(&self, artefact: &Artefact) -> Result<(), PluginError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A plugin plus its registration priority.
#[derive(Clone)]
pub struct PluginRegistration {
    pub priority: i32,
    pub plugin: Arc<dyn ArtefactPlugin>,
}

/// Priority-ordered set of registered plugins. Lower priority values are
/// processed first; equal priorities keep registration order.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    registrations: Vec<PluginRegistration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Insertion keeps the list sorted by priority,
    /// stable for equal priorities.
    pub fn register(&mut self, priority: i32, plugin: Arc<dyn ArtefactPlugin>) {
        let at = self
            .registrations
            .partition_point(|r| r.priority <= priority);
        self.registrations
            .insert(at, PluginRegistration { priority, plugin });
    }

    /// Resolve the plugin owning `artefact_type`, in priority order.
    pub fn resolve(&self, artefact_type: &ArtefactType) -> Result<&dyn ArtefactPlugin, CoreError> {
        self.plugin_for(artefact_type)
            .ok_or_else(|| CoreError::UnknownArtefactType {
                tag: artefact_type.as_str().to_owned(),
            })
    }

    /// Like [`resolve`](Self::resolve) but `None` on unknown types, for
    /// callers that skip unclaimed locations.
    pub fn plugin_for(&self, artefact_type: &ArtefactType) -> Option<&dyn ArtefactPlugin> {
        self.registrations
            .iter()
            .find(|r| r.plugin.accepts(artefact_type))
            .map(|r| r.plugin.as_ref())
    }

    /// Plugins in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ArtefactPlugin> {
        self.registrations.iter().map(|r| r.plugin.as_ref())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str);

    impl ArtefactPlugin for Stub {
        fn type_tag(&self) -> &str {
            self.0
        }
        fn parse(&self, _: &Location, _: &[u8]) -> Result<Vec<Artefact>, ParseError> {
            Ok(vec![])
        }
        fn retrieve(&self) -> Result<Vec<Artefact>, PluginError> {
            Ok(vec![])
        }
        fn apply(&self, _: &Artefact, _: ArtefactPhase) -> ApplyOutcome {
            ApplyOutcome::Applied
        }
        fn cleanup(&self, _: &Artefact) -> Result<(), PluginError> {
            Ok(())
        }
        fn persist(&self, _: &Artefact) -> Result<(), PluginError> {
            Ok(())
        }
        fn remove(&self, _: &Artefact) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn registry_orders_by_priority_then_insertion() {
        let mut registry = PluginRegistry::new();
        registry.register(20, Arc::new(Stub("job")));
        registry.register(10, Arc::new(Stub("proxy")));
        registry.register(20, Arc::new(Stub("schema")));

        let tags: Vec<&str> = registry.iter().map(|p| p.type_tag()).collect();
        assert_eq!(tags, ["proxy", "job", "schema"]);
    }

    #[test]
    fn resolve_unknown_type_is_a_checked_error() {
        let registry = PluginRegistry::new();
        let err = registry
            .resolve(&ArtefactType::from("proxy"))
            .err()
            .expect("unknown type must be an error");
        assert!(matches!(err, CoreError::UnknownArtefactType { tag } if tag == "proxy"));
    }

    #[test]
    fn resolve_finds_accepting_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(0, Arc::new(Stub("proxy")));
        let plugin = registry.resolve(&ArtefactType::from("proxy")).expect("resolve");
        assert_eq!(plugin.type_tag(), "proxy");
    }

    #[test]
    fn default_accepts_matches_tag_only() {
        let stub = Stub("proxy");
        assert!(stub.accepts(&ArtefactType::from("proxy")));
        assert!(!stub.accepts(&ArtefactType::from("job")));
    }
}
