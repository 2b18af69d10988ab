//! Error types for steward-engine.
//!
//! Per-artefact problems (parse errors, rejected applies, unsatisfied
//! dependencies, cleanup failures) are *not* errors at this level — they are
//! recorded on the artefact and the pass continues. `EngineError` covers
//! only pass-level bookkeeping faults that abort the whole pass.

use thiserror::Error;

use steward_core::{CoreError, PluginError};

use crate::pass::MAX_ARTEFACTS_PER_PASS;

/// Pass-aborting errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content source or plugin-registry failure (cannot read state at all).
    #[error("content source error: {0}")]
    Core(#[from] CoreError),

    /// A plugin's persistence layer failed; artefact state can no longer be
    /// trusted, so the pass stops.
    #[error("plugin store error: {0}")]
    Store(#[from] PluginError),

    /// The merged artefact set exceeded the documented per-pass bound
    /// ([`MAX_ARTEFACTS_PER_PASS`]).
    #[error("merged artefact set too large: {count} artefacts (bound {MAX_ARTEFACTS_PER_PASS})")]
    TooManyArtefacts { count: usize },
}
