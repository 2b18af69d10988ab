//! Domain types for the Steward artefact registry.
//!
//! An [`Artefact`] is one declaratively-defined unit under reconciliation: a
//! definition file in the registry tree, parsed by its owning plugin, driven
//! through the lifecycle state machine by the engine. All path-like fields
//! use the [`Location`] newtype (relative, slash-separated); identity is the
//! [`ArtefactKey`] content-address derived from type tag + logical name.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The string tag identifying which plugin owns an artefact (`proxy`, `job`…).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtefactType(pub String);

impl ArtefactType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtefactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtefactType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtefactType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A location in the content source: a relative, slash-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(pub String);

impl Location {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension of the final path segment, if any — doubles as the
    /// artefact type tag (`proxy/a.proxy` → `proxy`).
    pub fn type_tag(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some(("", _)) | None => None,
            Some((_, ext)) if ext.is_empty() => None,
            Some((_, ext)) => Some(ext),
        }
    }

    /// The final path segment without its extension.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable identity hash correlating a freshly parsed candidate with its
/// persisted counterpart: `hex(sha256(type ++ NUL ++ ident))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtefactKey(pub String);

impl ArtefactKey {
    /// Derive a key from a type tag and a logical identifier (the artefact's
    /// name when the plugin supplies one, its location otherwise).
    pub fn derive(artefact_type: &ArtefactType, ident: &str) -> Self {
        let mut h = Sha256::new();
        h.update(artefact_type.as_str().as_bytes());
        h.update([0u8]);
        h.update(ident.as_bytes());
        Self(hex::encode(h.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ArtefactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle and phase
// ---------------------------------------------------------------------------

/// Persisted outcome state of an artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    New,
    Created,
    Modified,
    Updated,
    Failed,
    Deleted,
}

impl Lifecycle {
    /// `Created` and `Updated` are the terminal success states a dependency
    /// must reach before its dependents are attempted.
    pub fn is_terminal_success(self) -> bool {
        matches!(self, Lifecycle::Created | Lifecycle::Updated)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::New => "new",
            Lifecycle::Created => "created",
            Lifecycle::Modified => "modified",
            Lifecycle::Updated => "updated",
            Lifecycle::Failed => "failed",
            Lifecycle::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// The operation being attempted against an artefact in the current pass.
/// Distinct from [`Lifecycle`], which is the *result* state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtefactPhase {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ArtefactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtefactPhase::Create => "create",
            ArtefactPhase::Update => "update",
            ArtefactPhase::Delete => "delete",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Artefact
// ---------------------------------------------------------------------------

/// The unit of reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artefact {
    pub artefact_type: ArtefactType,
    pub location: Location,
    pub key: ArtefactKey,
    /// Logical name, when the definition carries one; defaults to the
    /// location's file stem for plugins that name artefacts after files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Keys (possibly of other types) that must reach terminal success
    /// before this artefact is applied.
    #[serde(default)]
    pub dependencies: BTreeSet<ArtefactKey>,
    pub lifecycle: Lifecycle,
    /// Last failure message; cleared on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Type-specific payload, opaque to the core.
    #[serde(default)]
    pub content: serde_json::Value,
    /// Digest of `content`, used to decide update-vs-skip.
    pub content_hash: String,
    /// Digest of the content most recently applied successfully; `None`
    /// until the first successful `Create`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artefact {
    /// Build a fresh candidate in `New` state. The key derives from the
    /// logical name when present, the location otherwise.
    pub fn new(artefact_type: ArtefactType, location: Location, name: Option<String>) -> Self {
        let ident = name.clone().unwrap_or_else(|| location.0.clone());
        let key = ArtefactKey::derive(&artefact_type, &ident);
        let now = Utc::now();
        Self {
            artefact_type,
            location,
            key,
            name,
            dependencies: BTreeSet::new(),
            lifecycle: Lifecycle::New,
            error: None,
            content: serde_json::Value::Null,
            content_hash: content_digest(&serde_json::Value::Null),
            last_applied_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the opaque payload, recomputing the content digest.
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content_hash = content_digest(&content);
        self.content = content;
        self
    }

    pub fn with_dependencies(mut self, dependencies: BTreeSet<ArtefactKey>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Display handle for logs and tables: name when present, else location.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.location.as_str())
    }
}

/// Digest of a JSON payload. `serde_json::Value` maps are ordered, so the
/// serialised form (and therefore the digest) is deterministic.
pub fn content_digest(content: &serde_json::Value) -> String {
    let mut h = Sha256::new();
    h.update(content.to_string().as_bytes());
    hex::encode(h.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_derivation_is_stable() {
        let t = ArtefactType::from("proxy");
        let a = ArtefactKey::derive(&t, "gateway");
        let b = ArtefactKey::derive(&t, "gateway");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn key_differs_across_types_and_idents() {
        let proxy = ArtefactType::from("proxy");
        let job = ArtefactType::from("job");
        assert_ne!(
            ArtefactKey::derive(&proxy, "x"),
            ArtefactKey::derive(&job, "x")
        );
        assert_ne!(
            ArtefactKey::derive(&proxy, "x"),
            ArtefactKey::derive(&proxy, "y")
        );
    }

    #[test]
    fn location_type_tag_and_stem() {
        let loc = Location::from("proxy/a.proxy");
        assert_eq!(loc.type_tag(), Some("proxy"));
        assert_eq!(loc.file_stem(), "a");

        assert_eq!(Location::from("README").type_tag(), None);
        assert_eq!(Location::from(".hidden").type_tag(), None);
        assert_eq!(Location::from("jobs/nightly.job").file_stem(), "nightly");
    }

    #[test]
    fn content_digest_tracks_content() {
        let a = Artefact::new(ArtefactType::from("proxy"), Location::from("p/a.proxy"), None)
            .with_content(json!({"port": 80}));
        let b = Artefact::new(ArtefactType::from("proxy"), Location::from("p/a.proxy"), None)
            .with_content(json!({"port": 81}));
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash, content_digest(&json!({"port": 80})));
    }

    #[test]
    fn name_overrides_location_in_key() {
        let t = ArtefactType::from("proxy");
        let named = Artefact::new(t.clone(), Location::from("p/a.proxy"), Some("gw".into()));
        assert_eq!(named.key, ArtefactKey::derive(&t, "gw"));

        let unnamed = Artefact::new(t.clone(), Location::from("p/a.proxy"), None);
        assert_eq!(unnamed.key, ArtefactKey::derive(&t, "p/a.proxy"));
    }

    #[test]
    fn lifecycle_terminal_success() {
        assert!(Lifecycle::Created.is_terminal_success());
        assert!(Lifecycle::Updated.is_terminal_success());
        assert!(!Lifecycle::New.is_terminal_success());
        assert!(!Lifecycle::Failed.is_terminal_success());
        assert!(!Lifecycle::Deleted.is_terminal_success());
    }

    #[test]
    fn artefact_serde_roundtrip() {
        let artefact = Artefact::new(
            ArtefactType::from("proxy"),
            Location::from("proxy/a.proxy"),
            Some("a".into()),
        )
        .with_content(json!({"spec": {"port": 8080}}));
        let encoded = serde_json::to_string(&artefact).expect("serialize");
        let decoded: Artefact = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, artefact);
    }
}
