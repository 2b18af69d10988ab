//! JSON-file-backed artefact store.
//!
//! One file per artefact type, `<state>/<tag>.json`, holding a key-indexed
//! map of persisted artefacts. Every mutation rewrites the whole file
//! atomically (`.tmp` sibling + rename); a missing file reads as empty so
//! first runs need no setup.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use steward_core::plugin::{plugin_io_err, PluginError};
use steward_core::store::ArtefactStore;
use steward_core::types::{Artefact, ArtefactKey};

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by `<state_dir>/<tag>.json`.
    pub fn new(state_dir: &Path, tag: &str) -> Self {
        Self {
            path: state_dir.join(format!("{tag}.json")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<ArtefactKey, Artefact>, PluginError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(plugin_io_err(&self.path, err)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn flush(&self, map: &BTreeMap<ArtefactKey, Artefact>) -> Result<(), PluginError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| plugin_io_err(dir, e))?;
            restrict_dir(dir).map_err(|e| plugin_io_err(dir, e))?;
        }
        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| plugin_io_err(&tmp, e))?;
        restrict_file(&tmp).map_err(|e| plugin_io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| plugin_io_err(&self.path, e))?;
        Ok(())
    }
}

impl ArtefactStore for JsonFileStore {
    fn find_by_key(&self, key: &ArtefactKey) -> Result<Option<Artefact>, PluginError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        Ok(self.load()?.remove(key))
    }

    fn save(&self, artefact: &Artefact) -> Result<(), PluginError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.load()?;
        map.insert(artefact.key.clone(), artefact.clone());
        self.flush(&map)
    }

    fn delete(&self, key: &ArtefactKey) -> Result<(), PluginError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<Artefact>, PluginError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        Ok(self.load()?.into_values().collect())
    }
}

fn poisoned() -> PluginError {
    PluginError::Message("state store lock poisoned".to_string())
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
