//! Content source contract and filesystem implementation.
//!
//! The reconciliation core never writes to the content source; it only
//! enumerates locations and reads bytes. Change notification is the
//! daemon watcher's concern.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};
use crate::types::Location;

/// Read-only view of the versioned definition tree.
pub trait ContentSource: Send + Sync {
    /// Enumerate every definition file under the root, as relative
    /// slash-separated locations in deterministic (sorted) order.
    fn list(&self) -> Result<Vec<Location>, CoreError>;

    /// Read the bytes of one definition file.
    fn read(&self, location: &Location) -> Result<Vec<u8>, CoreError>;
}

/// Filesystem-backed content source rooted at a registry directory.
#[derive(Debug, Clone)]
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &Location) -> PathBuf {
        let mut path = self.root.clone();
        for segment in location.as_str().split('/') {
            path.push(segment);
        }
        path
    }
}

impl ContentSource for FsContentSource {
    fn list(&self) -> Result<Vec<Location>, CoreError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        // Iterative walk; directories may vanish mid-scan (editors, CI
        // checkouts), so NotFound is tolerated.
        let mut dirs = vec![self.root.clone()];
        let mut locations = Vec::new();
        while let Some(dir) = dirs.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&dir, err)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
                if ty.is_dir() {
                    dirs.push(entry.path());
                } else if ty.is_file() {
                    if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                        let rel = rel
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect::<Vec<_>>()
                            .join("/");
                        locations.push(Location::from(rel));
                    }
                }
            }
        }
        locations.sort();
        locations.dedup();
        Ok(locations)
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>, CoreError> {
        let path = self.resolve(location);
        fs::read(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                CoreError::LocationNotFound {
                    location: location.as_str().to_owned(),
                }
            } else {
                io_err(&path, err)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn list_walks_nested_dirs_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "proxy/b.proxy", "b");
        touch(tmp.path(), "proxy/a.proxy", "a");
        touch(tmp.path(), "jobs/nightly.job", "j");

        let source = FsContentSource::new(tmp.path());
        let locations = source.list().unwrap();
        assert_eq!(
            locations,
            vec![
                Location::from("jobs/nightly.job"),
                Location::from("proxy/a.proxy"),
                Location::from("proxy/b.proxy"),
            ]
        );
    }

    #[test]
    fn list_skips_hidden_entries() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".git/config", "x");
        touch(tmp.path(), "proxy/.a.proxy.swp", "x");
        touch(tmp.path(), "proxy/a.proxy", "a");

        let source = FsContentSource::new(tmp.path());
        let locations = source.list().unwrap();
        assert_eq!(locations, vec![Location::from("proxy/a.proxy")]);
    }

    #[test]
    fn list_on_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let source = FsContentSource::new(tmp.path().join("nope"));
        assert!(source.list().unwrap().is_empty());
    }

    #[test]
    fn read_returns_bytes() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "proxy/a.proxy", "name: a\n");
        let source = FsContentSource::new(tmp.path());
        let bytes = source.read(&Location::from("proxy/a.proxy")).unwrap();
        assert_eq!(bytes, b"name: a\n");
    }

    #[test]
    fn read_missing_location_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let source = FsContentSource::new(tmp.path());
        let err = source.read(&Location::from("gone.proxy")).unwrap_err();
        assert!(matches!(err, CoreError::LocationNotFound { .. }));
    }
}
