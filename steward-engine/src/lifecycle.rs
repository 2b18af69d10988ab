//! Lifecycle state machine rules.
//!
//! Pure decision functions, separated from the pass loop so the transition
//! table is testable without plugins or I/O. Transitions are monotonic
//! within one phase: `New -> Created`, `Modified -> Updated`, any ->
//! `Failed`, any -> `Deleted`; a failed artefact re-attempts the same
//! transition on the next pass.

use steward_core::types::{Artefact, ArtefactPhase, Lifecycle};

/// What the merge step decided for one candidate against its persisted
/// counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No persisted record, or never successfully applied: attempt `Create`.
    Create,
    /// Content differs from the last successfully applied content (or the
    /// last apply failed): attempt `Update`.
    Update,
    /// Content matches the last successful apply; nothing to do.
    Unchanged,
}

impl MergeDecision {
    pub fn phase(self) -> Option<ArtefactPhase> {
        match self {
            MergeDecision::Create => Some(ArtefactPhase::Create),
            MergeDecision::Update => Some(ArtefactPhase::Update),
            MergeDecision::Unchanged => None,
        }
    }
}

/// Compare a freshly parsed candidate with its persisted counterpart.
pub fn merge_decision(candidate: &Artefact, persisted: Option<&Artefact>) -> MergeDecision {
    let Some(prev) = persisted else {
        return MergeDecision::Create;
    };
    match &prev.last_applied_hash {
        // A record exists but no apply ever succeeded (deferred candidate,
        // failed create, parse placeholder): retry as Create.
        None => MergeDecision::Create,
        Some(applied) => {
            if *applied == candidate.content_hash && prev.lifecycle.is_terminal_success() {
                MergeDecision::Unchanged
            } else {
                MergeDecision::Update
            }
        }
    }
}

/// The lifecycle an artefact reaches when its plugin reports success for
/// `phase`.
pub fn on_success(phase: ArtefactPhase) -> Lifecycle {
    match phase {
        ArtefactPhase::Create => Lifecycle::Created,
        ArtefactPhase::Update => Lifecycle::Updated,
        ArtefactPhase::Delete => Lifecycle::Deleted,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use steward_core::types::{ArtefactType, Location};

    fn candidate(content: serde_json::Value) -> Artefact {
        Artefact::new(
            ArtefactType::from("proxy"),
            Location::from("proxy/a.proxy"),
            Some("a".into()),
        )
        .with_content(content)
    }

    fn persisted(
        content: serde_json::Value,
        lifecycle: Lifecycle,
        applied: bool,
    ) -> Artefact {
        let mut artefact = candidate(content);
        artefact.lifecycle = lifecycle;
        if applied {
            artefact.last_applied_hash = Some(artefact.content_hash.clone());
        }
        artefact
    }

    #[test]
    fn absent_record_means_create() {
        assert_eq!(
            merge_decision(&candidate(json!(1)), None),
            MergeDecision::Create
        );
    }

    #[test]
    fn never_applied_record_retries_create() {
        let prev = persisted(json!(1), Lifecycle::Failed, false);
        assert_eq!(
            merge_decision(&candidate(json!(1)), Some(&prev)),
            MergeDecision::Create
        );
    }

    #[test]
    fn identical_applied_content_is_unchanged() {
        let prev = persisted(json!({"port": 80}), Lifecycle::Created, true);
        assert_eq!(
            merge_decision(&candidate(json!({"port": 80})), Some(&prev)),
            MergeDecision::Unchanged
        );
    }

    #[test]
    fn changed_content_means_update() {
        let prev = persisted(json!({"port": 80}), Lifecycle::Created, true);
        assert_eq!(
            merge_decision(&candidate(json!({"port": 81})), Some(&prev)),
            MergeDecision::Update
        );
    }

    #[test]
    fn failed_update_retries_even_with_identical_content() {
        // Applied once, then a later update failed: lifecycle is Failed, the
        // last applied hash is stale — retry the update.
        let mut prev = persisted(json!({"port": 80}), Lifecycle::Failed, false);
        prev.last_applied_hash = Some("older".into());
        assert_eq!(
            merge_decision(&candidate(json!({"port": 80})), Some(&prev)),
            MergeDecision::Update
        );
    }

    #[rstest]
    #[case(ArtefactPhase::Create, Lifecycle::Created)]
    #[case(ArtefactPhase::Update, Lifecycle::Updated)]
    #[case(ArtefactPhase::Delete, Lifecycle::Deleted)]
    fn success_transitions(#[case] phase: ArtefactPhase, #[case] expected: Lifecycle) {
        assert_eq!(on_success(phase), expected);
    }

    #[test]
    fn merge_decision_phase_mapping() {
        assert_eq!(MergeDecision::Create.phase(), Some(ArtefactPhase::Create));
        assert_eq!(MergeDecision::Update.phase(), Some(ArtefactPhase::Update));
        assert_eq!(MergeDecision::Unchanged.phase(), None);
    }
}
