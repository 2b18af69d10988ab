//! Retry-budget bookkeeping for dependency-blocked artefacts.
//!
//! A deferred artefact gets `retry_count` attempts before it fails, with at
//! most one attempt counted per `retry_interval` window — a burst of manual
//! passes cannot burn the budget early. The book lives in the scheduler and
//! survives across passes; a successful apply (or completed deletion)
//! clears the entry.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use steward_core::types::ArtefactKey;

/// Verdict for one deferral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferralVerdict {
    /// Still within budget; `attempt` is 1-based.
    Deferred { attempt: u32 },
    /// Budget exhausted: the artefact fails with a dependency reason.
    Exhausted,
}

#[derive(Debug, Clone)]
struct DeferralEntry {
    attempts: u32,
    last_counted: DateTime<Utc>,
}

/// Per-artefact deferral attempt counts.
#[derive(Debug, Default)]
pub struct DeferralBook {
    entries: HashMap<ArtefactKey, DeferralEntry>,
}

impl DeferralBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `key` was deferred at `now` and return the verdict under
    /// the given budget.
    pub fn note_deferral(
        &mut self,
        key: &ArtefactKey,
        now: DateTime<Utc>,
        retry_count: u32,
        retry_interval: Duration,
    ) -> DeferralVerdict {
        let entry = self
            .entries
            .entry(key.clone())
            .and_modify(|e| {
                if now - e.last_counted >= retry_interval {
                    e.attempts += 1;
                    e.last_counted = now;
                }
            })
            .or_insert(DeferralEntry {
                attempts: 1,
                last_counted: now,
            });

        if entry.attempts > retry_count {
            DeferralVerdict::Exhausted
        } else {
            DeferralVerdict::Deferred {
                attempt: entry.attempts,
            }
        }
    }

    /// Forget `key` — called when the artefact finally applies or deletes.
    pub fn clear(&mut self, key: &ArtefactKey) {
        self.entries.remove(key);
    }

    pub fn attempts(&self, key: &ArtefactKey) -> u32 {
        self.entries.get(key).map(|e| e.attempts).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::ArtefactType;

    fn key() -> ArtefactKey {
        ArtefactKey::derive(&ArtefactType::from("proxy"), "a")
    }

    #[test]
    fn first_deferral_counts_one_attempt() {
        let mut book = DeferralBook::new();
        let verdict = book.note_deferral(&key(), Utc::now(), 3, Duration::zero());
        assert_eq!(verdict, DeferralVerdict::Deferred { attempt: 1 });
        assert_eq!(book.attempts(&key()), 1);
    }

    #[test]
    fn attempts_within_interval_are_not_counted_twice() {
        let mut book = DeferralBook::new();
        let t0 = Utc::now();
        let interval = Duration::milliseconds(10_000);

        book.note_deferral(&key(), t0, 3, interval);
        // 1s later — inside the window; attempt count must not move.
        let verdict = book.note_deferral(&key(), t0 + Duration::seconds(1), 3, interval);
        assert_eq!(verdict, DeferralVerdict::Deferred { attempt: 1 });

        // Past the window — counted.
        let verdict = book.note_deferral(&key(), t0 + Duration::seconds(11), 3, interval);
        assert_eq!(verdict, DeferralVerdict::Deferred { attempt: 2 });
    }

    #[test]
    fn budget_exhaustion_after_retry_count_attempts() {
        let mut book = DeferralBook::new();
        let mut now = Utc::now();
        let interval = Duration::milliseconds(1);

        for attempt in 1..=2u32 {
            now += Duration::milliseconds(5);
            assert_eq!(
                book.note_deferral(&key(), now, 2, interval),
                DeferralVerdict::Deferred { attempt }
            );
        }
        now += Duration::milliseconds(5);
        assert_eq!(
            book.note_deferral(&key(), now, 2, interval),
            DeferralVerdict::Exhausted
        );
    }

    #[test]
    fn clear_resets_the_budget() {
        let mut book = DeferralBook::new();
        let now = Utc::now();
        book.note_deferral(&key(), now, 3, Duration::zero());
        book.clear(&key());
        assert_eq!(book.attempts(&key()), 0);
        assert!(book.is_empty());
        assert_eq!(
            book.note_deferral(&key(), now + Duration::seconds(1), 3, Duration::zero()),
            DeferralVerdict::Deferred { attempt: 1 }
        );
    }

    #[test]
    fn zero_retry_budget_exhausts_immediately() {
        let mut book = DeferralBook::new();
        assert_eq!(
            book.note_deferral(&key(), Utc::now(), 0, Duration::zero()),
            DeferralVerdict::Exhausted
        );
    }
}
