//! The manifest artefact plugin.
//!
//! Applying a manifest materialises its content as
//! `<deploy>/<tag>/<name>.json`; deleting it removes that file. Writes are
//! hash-gated (byte-identical content is left untouched) and atomic, so
//! repeated applies are idempotent and readers never observe a partial
//! file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use steward_core::paths;
use steward_core::plugin::{plugin_io_err, ApplyOutcome, ArtefactPlugin, ParseError, PluginError};
use steward_core::store::ArtefactStore;
use steward_core::types::{Artefact, ArtefactPhase, ArtefactType, Location};

use crate::manifest::parse_manifest;
use crate::store::JsonFileStore;

pub struct ManifestPlugin {
    artefact_type: ArtefactType,
    store: JsonFileStore,
    deploy_dir: PathBuf,
}

impl ManifestPlugin {
    /// Plugin for `tag` artefacts rooted under `home`'s steward tree.
    pub fn new_at(home: &Path, tag: &str) -> Self {
        Self {
            artefact_type: ArtefactType::from(tag),
            store: JsonFileStore::new(&paths::state_dir(home), tag),
            deploy_dir: paths::deploy_dir(home).join(tag),
        }
    }

    fn target_path(&self, artefact: &Artefact) -> PathBuf {
        let name = artefact
            .name
            .as_deref()
            .unwrap_or_else(|| artefact.location.file_stem());
        self.deploy_dir.join(format!("{name}.json"))
    }

    fn write_deployment(&self, artefact: &Artefact) -> Result<bool, PluginError> {
        let target = self.target_path(artefact);
        let rendered = serde_json::to_vec_pretty(&artefact.content)?;

        if let Ok(existing) = fs::read(&target) {
            if existing == rendered {
                return Ok(false);
            }
        }

        fs::create_dir_all(&self.deploy_dir).map_err(|e| plugin_io_err(&self.deploy_dir, e))?;
        let tmp = target.with_extension("json.tmp");
        fs::write(&tmp, &rendered).map_err(|e| plugin_io_err(&tmp, e))?;
        fs::rename(&tmp, &target).map_err(|e| plugin_io_err(&target, e))?;
        Ok(true)
    }
}

impl ArtefactPlugin for ManifestPlugin {
    fn type_tag(&self) -> &str {
        self.artefact_type.as_str()
    }

    fn parse(&self, location: &Location, bytes: &[u8]) -> Result<Vec<Artefact>, ParseError> {
        parse_manifest(&self.artefact_type, location, bytes).map(|a| vec![a])
    }

    fn retrieve(&self) -> Result<Vec<Artefact>, PluginError> {
        self.store.list()
    }

    fn apply(&self, artefact: &Artefact, phase: ArtefactPhase) -> ApplyOutcome {
        match self.write_deployment(artefact) {
            Ok(written) => {
                if written {
                    tracing::debug!(
                        name = artefact.display_name(),
                        %phase,
                        "deployment written"
                    );
                }
                ApplyOutcome::Applied
            }
            Err(err) => ApplyOutcome::rejected(err.to_string()),
        }
    }

    fn cleanup(&self, artefact: &Artefact) -> Result<(), PluginError> {
        let target = self.target_path(artefact);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            // Already gone: deletion is idempotent.
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(plugin_io_err(&target, err)),
        }
    }

    fn persist(&self, artefact: &Artefact) -> Result<(), PluginError> {
        self.store.save(artefact)
    }

    fn remove(&self, artefact: &Artefact) -> Result<(), PluginError> {
        self.store.delete(&artefact.key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
