//! Reconciliation engine for `steward`.
//!
//! Drives declaratively-defined artefacts from their definition files to
//! their materialised form: parse, merge against persisted state, order by
//! dependencies, apply, and clean up what was removed. The engine is
//! synchronous and I/O-free apart from what plugins and the content source
//! do; scheduling and change detection live in `steward-daemon`.

pub mod defer;
pub mod error;
pub mod lifecycle;
pub mod pass;
pub mod report;

pub use defer::{DeferralBook, DeferralVerdict};
pub use error::EngineError;
pub use lifecycle::{merge_decision, on_success, MergeDecision};
pub use pass::{run_pass, MAX_ARTEFACTS_PER_PASS};
pub use report::{
    CollectingRecorder, OutcomeRecorder, PassOutcome, PassReport, TracingRecorder,
    TransitionRecord,
};
