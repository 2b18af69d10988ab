//! One reconciliation pass.
//!
//! A pass is a pure function of (content source, plugin stores, deferral
//! book): enumerate definitions, parse them through their owning plugins,
//! merge against persisted state, order by dependencies, then drive each
//! artefact through its create/update/delete phase. Per-artefact problems
//! are recorded on the artefact and never abort the pass; only
//! infrastructure faults (unreadable source, broken store) do.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use steward_core::config::ReconcileConfig;
use steward_core::plugin::{ApplyOutcome, PluginRegistry};
use steward_core::source::ContentSource;
use steward_core::types::{Artefact, ArtefactKey, ArtefactPhase, ArtefactType, Lifecycle, Location};
use steward_core::CoreError;
use steward_graph::{sort, DependencyNode};

use crate::defer::{DeferralBook, DeferralVerdict};
use crate::error::EngineError;
use crate::lifecycle::{merge_decision, on_success, MergeDecision};
use crate::report::{OutcomeRecorder, PassOutcome, PassReport, TransitionRecord};

/// Hard bound on the merged artefact set of a single pass. A registry tree
/// larger than this aborts the pass instead of degrading silently.
pub const MAX_ARTEFACTS_PER_PASS: usize = 10_000;

/// One artefact plus the phase the pass will attempt for it.
struct WorkItem {
    artefact: Artefact,
    phase: ArtefactPhase,
}

impl DependencyNode for WorkItem {
    fn key(&self) -> &ArtefactKey {
        &self.artefact.key
    }
    fn dependencies(&self) -> Vec<ArtefactKey> {
        self.artefact.dependencies.iter().cloned().collect()
    }
}

/// Run one full reconciliation pass.
///
/// `book` carries deferral budgets across passes; the caller owns it for the
/// lifetime of the scheduler. Every non-unchanged artefact is reported to
/// `recorder` as it settles.
pub fn run_pass(
    registry: &PluginRegistry,
    source: &dyn ContentSource,
    config: &ReconcileConfig,
    book: &mut DeferralBook,
    recorder: &mut dyn OutcomeRecorder,
) -> Result<PassReport, EngineError> {
    let started_at = Utc::now();
    let clock = std::time::Instant::now();
    let mut report = PassReport::begin(started_at);

    // Persisted state, plugins in priority order.
    let mut persisted: HashMap<ArtefactKey, Artefact> = HashMap::new();
    let mut persisted_order: Vec<ArtefactKey> = Vec::new();
    for plugin in registry.iter() {
        for artefact in plugin.retrieve()? {
            if !persisted.contains_key(&artefact.key) {
                persisted_order.push(artefact.key.clone());
            }
            persisted.insert(artefact.key.clone(), artefact);
        }
    }

    // Parse the definition tree. A malformed file fails in place (as a
    // placeholder artefact keyed by its location) and shields any persisted
    // artefacts at that location from deletion.
    let mut candidates: HashMap<ArtefactKey, Artefact> = HashMap::new();
    let mut candidate_order: Vec<ArtefactKey> = Vec::new();
    let mut failed_locations: HashSet<Location> = HashSet::new();

    for location in source.list()? {
        let Some(tag) = location.type_tag() else {
            continue;
        };
        let artefact_type = ArtefactType::from(tag);
        let Some(plugin) = registry.plugin_for(&artefact_type) else {
            tracing::debug!(location = %location, tag, "no plugin claims location, skipping");
            continue;
        };

        // The file may vanish between list and read.
        let bytes = match source.read(&location) {
            Ok(bytes) => bytes,
            Err(CoreError::LocationNotFound { .. }) => continue,
            Err(err) => return Err(err.into()),
        };

        match plugin.parse(&location, &bytes) {
            Ok(parsed) => {
                for artefact in parsed {
                    if !candidates.contains_key(&artefact.key) {
                        candidate_order.push(artefact.key.clone());
                    }
                    candidates.insert(artefact.key.clone(), artefact);
                }
            }
            Err(parse_err) => {
                failed_locations.insert(location.clone());
                let mut placeholder = Artefact::new(artefact_type, location, None);
                placeholder.lifecycle = Lifecycle::Failed;
                placeholder.error = Some(parse_err.to_string());
                plugin.persist(&placeholder)?;
                emit(&mut report, recorder, &placeholder, None, PassOutcome::Failed);
            }
        }
    }

    // Merge candidates against persisted state.
    let mut items: Vec<WorkItem> = Vec::new();
    for key in &candidate_order {
        let Some(mut candidate) = candidates.get(key).cloned() else {
            continue;
        };
        let prev = persisted.get(key);
        let decision = merge_decision(&candidate, prev);
        if let Some(prev) = prev {
            candidate.created_at = prev.created_at;
            candidate.last_applied_hash = prev.last_applied_hash.clone();
        }
        match decision {
            MergeDecision::Unchanged => report.count(PassOutcome::Unchanged),
            MergeDecision::Create => {
                candidate.lifecycle = Lifecycle::New;
                items.push(WorkItem {
                    artefact: candidate,
                    phase: ArtefactPhase::Create,
                });
            }
            MergeDecision::Update => {
                candidate.lifecycle = Lifecycle::Modified;
                items.push(WorkItem {
                    artefact: candidate,
                    phase: ArtefactPhase::Update,
                });
            }
        }
    }

    // Persisted artefacts with no surviving definition are deleted, unless
    // their location failed to parse this pass.
    for key in &persisted_order {
        if candidates.contains_key(key) {
            continue;
        }
        let Some(artefact) = persisted.get(key) else {
            continue;
        };
        if failed_locations.contains(&artefact.location) {
            continue;
        }
        items.push(WorkItem {
            artefact: artefact.clone(),
            phase: ArtefactPhase::Delete,
        });
    }

    let merged = candidates.len() + items.iter().filter(|i| i.phase == ArtefactPhase::Delete).count();
    if merged > MAX_ARTEFACTS_PER_PASS {
        return Err(EngineError::TooManyArtefacts { count: merged });
    }

    // Dependency order. Nodes the sorter cannot place fail in place with
    // the sorter's reason.
    let outcome = sort(items);
    for (item, failure) in outcome.failed {
        let mut artefact = item.artefact;
        artefact.lifecycle = Lifecycle::Failed;
        artefact.error = Some(failure.to_string());
        artefact.updated_at = Utc::now();
        let plugin = registry.resolve(&artefact.artefact_type)?;
        plugin.persist(&artefact)?;
        emit(
            &mut report,
            recorder,
            &artefact,
            Some(item.phase),
            PassOutcome::Failed,
        );
    }

    // Dependency satisfaction is judged against the latest known lifecycle:
    // persisted state going in, updated as artefacts settle this pass.
    let mut statuses: HashMap<ArtefactKey, Lifecycle> = persisted
        .iter()
        .map(|(k, a)| (k.clone(), a.lifecycle))
        .collect();

    let mut live: Vec<WorkItem> = Vec::new();
    let mut deletes: Vec<WorkItem> = Vec::new();
    for item in outcome.ordered {
        match item.phase {
            ArtefactPhase::Delete => deletes.push(item),
            _ => live.push(item),
        }
    }

    // Create/update in topological order, re-queueing items whose
    // dependencies have not yet settled, as long as each round makes
    // progress.
    let mut queue = live;
    loop {
        let mut deferred: Vec<WorkItem> = Vec::new();
        let mut progress = false;
        for item in queue {
            if !dependencies_satisfied(&item.artefact, &statuses) {
                deferred.push(item);
                continue;
            }
            progress = true;
            let mut artefact = item.artefact;
            let plugin = registry.resolve(&artefact.artefact_type)?;
            match plugin.apply(&artefact, item.phase) {
                ApplyOutcome::Applied => {
                    artefact.lifecycle = on_success(item.phase);
                    artefact.error = None;
                    artefact.last_applied_hash = Some(artefact.content_hash.clone());
                    artefact.updated_at = Utc::now();
                    plugin.persist(&artefact)?;
                    statuses.insert(artefact.key.clone(), artefact.lifecycle);
                    book.clear(&artefact.key);
                    let outcome = match item.phase {
                        ArtefactPhase::Create => PassOutcome::Created,
                        _ => PassOutcome::Updated,
                    };
                    emit(&mut report, recorder, &artefact, Some(item.phase), outcome);
                }
                ApplyOutcome::Rejected { message } => {
                    artefact.lifecycle = Lifecycle::Failed;
                    artefact.error = Some(message);
                    artefact.updated_at = Utc::now();
                    plugin.persist(&artefact)?;
                    statuses.insert(artefact.key.clone(), Lifecycle::Failed);
                    emit(
                        &mut report,
                        recorder,
                        &artefact,
                        Some(item.phase),
                        PassOutcome::Failed,
                    );
                }
            }
        }
        if deferred.is_empty() || !progress {
            queue = deferred;
            break;
        }
        queue = deferred;
    }

    // Whatever is still blocked spends one deferral attempt, rate-limited
    // so back-to-back passes do not burn the budget.
    let now = Utc::now();
    let retry_interval = chrono::Duration::milliseconds(config.retry_interval_millis as i64);
    for item in queue {
        let mut artefact = item.artefact;
        let plugin = registry.resolve(&artefact.artefact_type)?;
        match book.note_deferral(&artefact.key, now, config.retry_count, retry_interval) {
            DeferralVerdict::Deferred { attempt } => {
                artefact.updated_at = now;
                plugin.persist(&artefact)?;
                tracing::debug!(
                    key = %artefact.key.short(),
                    attempt,
                    "dependencies not settled, deferring"
                );
                emit(
                    &mut report,
                    recorder,
                    &artefact,
                    Some(item.phase),
                    PassOutcome::Deferred,
                );
            }
            DeferralVerdict::Exhausted => {
                artefact.lifecycle = Lifecycle::Failed;
                artefact.error = Some("dependency not satisfied within retry budget".to_string());
                artefact.updated_at = now;
                plugin.persist(&artefact)?;
                statuses.insert(artefact.key.clone(), Lifecycle::Failed);
                book.clear(&artefact.key);
                emit(
                    &mut report,
                    recorder,
                    &artefact,
                    Some(item.phase),
                    PassOutcome::Failed,
                );
            }
        }
    }

    // Deletions run dependents-first (reverse topological order) and are
    // blocked while any surviving artefact still references the target. A
    // record that does not leave the Delete phase this pass keeps pinning
    // its own dependencies, so they stay blocked too.
    let mut referenced = live_references(&candidates, &persisted, &failed_locations);
    for item in deletes.into_iter().rev() {
        let mut artefact = item.artefact;
        let plugin = registry.resolve(&artefact.artefact_type)?;
        if referenced.contains(&artefact.key) {
            match book.note_deferral(&artefact.key, now, config.retry_count, retry_interval) {
                DeferralVerdict::Deferred { attempt } => {
                    tracing::debug!(
                        key = %artefact.key.short(),
                        attempt,
                        "still referenced, deferring deletion"
                    );
                    emit(
                        &mut report,
                        recorder,
                        &artefact,
                        Some(ArtefactPhase::Delete),
                        PassOutcome::Deferred,
                    );
                }
                DeferralVerdict::Exhausted => {
                    artefact.lifecycle = Lifecycle::Failed;
                    artefact.error =
                        Some("still referenced by other artefacts, deletion abandoned".to_string());
                    artefact.updated_at = now;
                    plugin.persist(&artefact)?;
                    book.clear(&artefact.key);
                    emit(
                        &mut report,
                        recorder,
                        &artefact,
                        Some(ArtefactPhase::Delete),
                        PassOutcome::Failed,
                    );
                }
            }
            referenced.extend(artefact.dependencies.iter().cloned());
            continue;
        }

        // A record that never applied has nothing materialised to clean up;
        // skipping cleanup also keeps a parse placeholder's deletion from
        // touching a real artefact's output.
        if artefact.last_applied_hash.is_some() {
            if let Err(err) = plugin.cleanup(&artefact) {
                artefact.lifecycle = Lifecycle::Failed;
                artefact.error = Some(format!("cleanup failed: {err}"));
                artefact.updated_at = now;
                plugin.persist(&artefact)?;
                emit(
                    &mut report,
                    recorder,
                    &artefact,
                    Some(ArtefactPhase::Delete),
                    PassOutcome::Failed,
                );
                referenced.extend(artefact.dependencies.iter().cloned());
                continue;
            }
        }
        plugin.remove(&artefact)?;
        artefact.lifecycle = Lifecycle::Deleted;
        artefact.error = None;
        book.clear(&artefact.key);
        statuses.insert(artefact.key.clone(), Lifecycle::Deleted);
        emit(
            &mut report,
            recorder,
            &artefact,
            Some(ArtefactPhase::Delete),
            PassOutcome::Deleted,
        );
    }

    report.duration_ms = clock.elapsed().as_millis() as u64;
    Ok(report)
}

fn dependencies_satisfied(artefact: &Artefact, statuses: &HashMap<ArtefactKey, Lifecycle>) -> bool {
    artefact.dependencies.iter().all(|dep| {
        // Unknown keys belong to nothing under management; treat them as
        // satisfied, consistent with the sorter.
        statuses
            .get(dep)
            .map(|l| l.is_terminal_success())
            .unwrap_or(true)
    })
}

/// Keys referenced as dependencies by artefacts that survive this pass:
/// every candidate, plus persisted artefacts shielded by a parse failure.
fn live_references(
    candidates: &HashMap<ArtefactKey, Artefact>,
    persisted: &HashMap<ArtefactKey, Artefact>,
    failed_locations: &HashSet<Location>,
) -> HashSet<ArtefactKey> {
    let mut referenced = HashSet::new();
    for artefact in candidates.values() {
        referenced.extend(artefact.dependencies.iter().cloned());
    }
    for artefact in persisted.values() {
        if !candidates.contains_key(&artefact.key) && failed_locations.contains(&artefact.location)
        {
            referenced.extend(artefact.dependencies.iter().cloned());
        }
    }
    referenced
}

fn emit(
    report: &mut PassReport,
    recorder: &mut dyn OutcomeRecorder,
    artefact: &Artefact,
    phase: Option<ArtefactPhase>,
    outcome: PassOutcome,
) {
    let record = TransitionRecord::new(artefact, phase, outcome);
    recorder.record(&record);
    report.transitions.push(record);
    report.count(outcome);
}
