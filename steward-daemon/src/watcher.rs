//! Registry change watcher.
//!
//! The watcher does not carry event payloads anywhere: it collapses all
//! filesystem activity under the registry root into a single dirty flag the
//! scheduler samples at each tick. Missed or coalesced events therefore cost
//! at most one idle interval, and a watcher failure degrades to running
//! every tick rather than stopping reconciliation.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{io_err, DaemonError};

pub struct ChangeWatcher {
    dirty: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// A watcher that starts dirty, so the first sample always triggers a
    /// pass.
    pub fn new() -> Self {
        Self {
            dirty: Arc::new(AtomicBool::new(true)),
            watcher: None,
        }
    }

    /// Watch `root` recursively, replacing any previous watch. If the
    /// platform watcher cannot be set up the flag is forced permanently
    /// dirty and the daemon falls back to polling every interval.
    pub fn start(&mut self, root: &Path) -> Result<(), DaemonError> {
        self.stop();

        if !root.exists() {
            fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
        }

        let dirty = self.dirty.clone();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) if is_relevant(&event) => {
                    dirty.store(true, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "watcher event error, forcing pass");
                    dirty.store(true, Ordering::SeqCst);
                }
            }
        })?;

        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => {
                self.watcher = Some(watcher);
                tracing::debug!(root = %root.display(), "watching registry root");
            }
            Err(err) => {
                tracing::warn!(
                    root = %root.display(),
                    error = %err,
                    "cannot watch registry root, every interval will reconcile"
                );
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.watcher = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Called at the start of a pass: events during the pass re-dirty the
    /// flag and schedule a follow-up.
    pub fn clear(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Re-arm after an aborted pass so the next tick retries.
    pub fn force(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Degraded mode: no watch is active and every tick reconciles.
    pub fn is_polling(&self) -> bool {
        self.watcher.is_none()
    }
}

impl Default for ChangeWatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn is_relevant(event: &Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    // Editor droppings and VCS noise are hidden files; the content source
    // skips them, so changes to them need no pass.
    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| !name.starts_with('.'))
            .unwrap_or(true)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
