//! Per-plugin persistence contract.
//!
//! Each plugin owns one store holding the persisted representation of its
//! artefacts. The engine only ever touches stores through the owning
//! plugin's `retrieve`/`persist`/`remove` hooks.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::plugin::PluginError;
use crate::types::{Artefact, ArtefactKey};

/// Generic CRUD surface over a plugin's persisted artefacts.
pub trait ArtefactStore: Send + Sync {
    fn find_by_key(&self, key: &ArtefactKey) -> Result<Option<Artefact>, PluginError>;
    fn save(&self, artefact: &Artefact) -> Result<(), PluginError>;
    fn delete(&self, key: &ArtefactKey) -> Result<(), PluginError>;
    /// All persisted artefacts, in deterministic (key) order.
    fn list(&self) -> Result<Vec<Artefact>, PluginError>;
}

/// In-memory store, for tests and ephemeral plugins.
#[derive(Default)]
pub struct MemoryStore {
    artefacts: Mutex<BTreeMap<ArtefactKey, Artefact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtefactStore for MemoryStore {
    fn find_by_key(&self, key: &ArtefactKey) -> Result<Option<Artefact>, PluginError> {
        let map = self.artefacts.lock().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn save(&self, artefact: &Artefact) -> Result<(), PluginError> {
        let mut map = self.artefacts.lock().map_err(|_| poisoned())?;
        map.insert(artefact.key.clone(), artefact.clone());
        Ok(())
    }

    fn delete(&self, key: &ArtefactKey) -> Result<(), PluginError> {
        let mut map = self.artefacts.lock().map_err(|_| poisoned())?;
        map.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Artefact>, PluginError> {
        let map = self.artefacts.lock().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }
}

fn poisoned() -> PluginError {
    PluginError::Message("artefact store lock poisoned".to_string())
}
