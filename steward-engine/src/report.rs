//! Pass reporting.
//!
//! Every artefact a pass touches produces one [`TransitionRecord`]; the pass
//! returns a [`PassReport`] aggregating them. Recording is pluggable through
//! [`OutcomeRecorder`] so the daemon can log transitions as they happen while
//! tests collect them for assertions.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use steward_core::types::{Artefact, ArtefactKey, ArtefactPhase, ArtefactType, Location};

/// Terminal outcome of one artefact within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Failed,
    Deferred,
}

/// One artefact's journey through a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub key: ArtefactKey,
    pub artefact_type: ArtefactType,
    pub location: Location,
    pub name: Option<String>,
    pub phase: Option<ArtefactPhase>,
    pub outcome: PassOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransitionRecord {
    pub fn new(artefact: &Artefact, phase: Option<ArtefactPhase>, outcome: PassOutcome) -> Self {
        Self {
            key: artefact.key.clone(),
            artefact_type: artefact.artefact_type.clone(),
            location: artefact.location.clone(),
            name: artefact.name.clone(),
            phase,
            outcome,
            error: artefact.error.clone(),
        }
    }
}

/// Aggregated result of one reconciliation pass. Serialized whole over the
/// daemon socket, so the CLI can render daemon and in-process passes alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Candidates plus deletions considered, including unchanged artefacts.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    pub deferred: usize,
    /// Everything except unchanged artefacts, in processing order.
    pub transitions: Vec<TransitionRecord>,
}

impl PassReport {
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            processed: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            failed: 0,
            deferred: 0,
            transitions: Vec::new(),
        }
    }

    pub fn count(&mut self, outcome: PassOutcome) {
        self.processed += 1;
        match outcome {
            PassOutcome::Created => self.created += 1,
            PassOutcome::Updated => self.updated += 1,
            PassOutcome::Unchanged => self.unchanged += 1,
            PassOutcome::Deleted => self.deleted += 1,
            PassOutcome::Failed => self.failed += 1,
            PassOutcome::Deferred => self.deferred += 1,
        }
    }

    /// True when a follow-up pass would do more work without any definition
    /// changing (deferred artefacts waiting on their dependencies).
    pub fn has_pending(&self) -> bool {
        self.deferred > 0
    }

    /// True when the pass changed nothing on disk.
    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Recorders
// ---------------------------------------------------------------------------

/// Observes transitions as the pass makes them.
pub trait OutcomeRecorder {
    fn record(&mut self, record: &TransitionRecord);
}

/// Logs each transition through `tracing`, the way the daemon consumes them.
#[derive(Debug, Default)]
pub struct TracingRecorder;

impl OutcomeRecorder for TracingRecorder {
    fn record(&mut self, record: &TransitionRecord) {
        match record.outcome {
            PassOutcome::Failed => tracing::warn!(
                key = %record.key.short(),
                artefact_type = %record.artefact_type,
                location = %record.location,
                error = record.error.as_deref().unwrap_or("unknown"),
                "artefact failed"
            ),
            PassOutcome::Deferred => tracing::debug!(
                key = %record.key.short(),
                artefact_type = %record.artefact_type,
                location = %record.location,
                "artefact deferred"
            ),
            _ => tracing::info!(
                key = %record.key.short(),
                artefact_type = %record.artefact_type,
                location = %record.location,
                outcome = ?record.outcome,
                "artefact reconciled"
            ),
        }
    }
}

/// Collects transitions in memory for assertions.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    pub records: Vec<TransitionRecord>,
}

impl OutcomeRecorder for CollectingRecorder {
    fn record(&mut self, record: &TransitionRecord) {
        self.records.push(record.clone());
    }
}

impl CollectingRecorder {
    pub fn outcome_for(&self, key: &ArtefactKey) -> Option<PassOutcome> {
        self.records
            .iter()
            .rev()
            .find(|r| &r.key == key)
            .map(|r| r.outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::{Artefact, ArtefactType, Location};

    fn artefact(name: &str) -> Artefact {
        Artefact::new(
            ArtefactType::from("proxy"),
            Location::from(format!("proxy/{name}.proxy")),
            Some(name.to_string()),
        )
    }

    #[test]
    fn count_tallies_each_outcome_once() {
        let mut report = PassReport::begin(Utc::now());
        report.count(PassOutcome::Created);
        report.count(PassOutcome::Created);
        report.count(PassOutcome::Unchanged);
        report.count(PassOutcome::Deferred);
        assert_eq!(report.processed, 4);
        assert_eq!(report.created, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.deferred, 1);
        assert!(report.has_pending());
    }

    #[test]
    fn quiet_pass_has_no_transitions() {
        let mut report = PassReport::begin(Utc::now());
        report.count(PassOutcome::Unchanged);
        assert!(report.is_quiet());
        assert!(!report.has_pending());
    }

    #[test]
    fn collecting_recorder_returns_latest_outcome() {
        let mut recorder = CollectingRecorder::default();
        let a = artefact("a");
        recorder.record(&TransitionRecord::new(
            &a,
            Some(ArtefactPhase::Create),
            PassOutcome::Deferred,
        ));
        recorder.record(&TransitionRecord::new(
            &a,
            Some(ArtefactPhase::Create),
            PassOutcome::Created,
        ));
        assert_eq!(recorder.outcome_for(&a.key), Some(PassOutcome::Created));
    }

    #[test]
    fn transition_record_serializes_without_null_error() {
        let record = TransitionRecord::new(
            &artefact("a"),
            Some(ArtefactPhase::Create),
            PassOutcome::Created,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["outcome"], "created");
    }
}
