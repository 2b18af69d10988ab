//! Manifest definition format.
//!
//! A manifest is one YAML document in a `<name>.<tag>` file under the
//! registry tree:
//!
//! ```yaml
//! name: gateway
//! depends_on:
//!   - manifest:backend
//! spec:
//!   port: 8080
//! ```
//!
//! `depends_on` entries are `tag:name` references; a bare `name` refers to
//! an artefact of the same type. `spec` is an arbitrary payload carried
//! through to the deployed JSON verbatim.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::json;

use steward_core::plugin::ParseError;
use steward_core::types::{Artefact, ArtefactKey, ArtefactType, Location};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDoc {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

/// Parse one manifest file into an artefact of `artefact_type`.
pub fn parse_manifest(
    artefact_type: &ArtefactType,
    location: &Location,
    bytes: &[u8],
) -> Result<Artefact, ParseError> {
    let doc: ManifestDoc = serde_yaml::from_slice(bytes)
        .map_err(|e| ParseError::new(location.clone(), e.to_string()))?;

    validate_name(location, &doc.name)?;

    let mut dependencies = BTreeSet::new();
    for reference in &doc.depends_on {
        dependencies.insert(resolve_reference(artefact_type, location, reference)?);
    }

    // YAML payload re-encoded as JSON so hashing and deployment are
    // format-stable.
    let spec: serde_json::Value = serde_json::to_value(&doc.spec)
        .map_err(|e| ParseError::new(location.clone(), format!("spec not JSON-mappable: {e}")))?;

    let artefact = Artefact::new(
        artefact_type.clone(),
        location.clone(),
        Some(doc.name.clone()),
    )
    .with_content(json!({
        "name": doc.name,
        "depends_on": doc.depends_on,
        "spec": spec,
    }))
    .with_dependencies(dependencies);

    Ok(artefact)
}

/// The name ends up as a deployment file name, so it must be a single safe
/// path segment.
fn validate_name(location: &Location, name: &str) -> Result<(), ParseError> {
    if name.is_empty() {
        return Err(ParseError::new(location.clone(), "empty artefact name"));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(ParseError::new(
            location.clone(),
            format!("artefact name '{name}' is not a valid file name"),
        ));
    }
    Ok(())
}

fn resolve_reference(
    own_type: &ArtefactType,
    location: &Location,
    reference: &str,
) -> Result<ArtefactKey, ParseError> {
    let (tag, name) = match reference.split_once(':') {
        Some((tag, name)) => (ArtefactType::from(tag), name),
        None => (own_type.clone(), reference),
    };
    if tag.as_str().is_empty() || name.is_empty() {
        return Err(ParseError::new(
            location.clone(),
            format!("malformed dependency reference '{reference}'"),
        ));
    }
    Ok(ArtefactKey::derive(&tag, name))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
