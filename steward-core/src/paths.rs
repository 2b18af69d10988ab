//! `~/.steward/` directory layout.
//!
//! ```text
//! ~/.steward/
//!   config.yaml    (recognized options, serde defaults)
//!   registry/      (content source root — definition files, edited out-of-band)
//!   state/         (per-plugin persisted artefact stores)
//!   deploy/        (materialised artefacts written by the manifest plugin)
//!   run/           (daemon socket)
//! ```
//!
//! Every function takes an explicit `home: &Path`; callers that want the
//! real home directory resolve it once via [`home_dir`].

use std::path::{Path, PathBuf};

use crate::error::CoreError;

pub fn steward_root(home: &Path) -> PathBuf {
    home.join(".steward")
}

pub fn config_path(home: &Path) -> PathBuf {
    steward_root(home).join("config.yaml")
}

pub fn default_registry_root(home: &Path) -> PathBuf {
    steward_root(home).join("registry")
}

pub fn state_dir(home: &Path) -> PathBuf {
    steward_root(home).join("state")
}

pub fn deploy_dir(home: &Path) -> PathBuf {
    steward_root(home).join("deploy")
}

pub fn run_dir(home: &Path) -> PathBuf {
    steward_root(home).join("run")
}

/// `dirs::home_dir()` with a checked error.
pub fn home_dir() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
