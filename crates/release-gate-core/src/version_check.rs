//! Tag/version consistency check.
//!
//! The single predicate guarding a release: the version derived from the
//! trigger tag must equal the version the packaging manifest declares. It has
//! no side effects, so evaluating it twice on the same input gives the same
//! answer.

use crate::error::{GateError, Result};
use crate::manifest::{DeclaredVersion, Manifest};
use crate::tag::TagName;
use serde::{Deserialize, Serialize};

/// A successful consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMatch {
    pub tag: TagName,
    pub declared: DeclaredVersion,
}

impl VersionMatch {
    /// The agreed release version.
    pub fn version(&self) -> &str {
        &self.declared.value
    }
}

/// Compare a parsed tag against a parsed manifest.
pub fn check_version(tag: &TagName, manifest: &Manifest) -> Result<VersionMatch> {
    let declared = manifest.declared_version();
    match declared {
        Some(declared) if declared.value.trim() == tag.version.trim() => Ok(VersionMatch {
            tag: tag.clone(),
            declared,
        }),
        other => Err(GateError::VersionMismatch {
            tag_version: tag.version.clone(),
            declared: other.map(|d| d.value),
        }),
    }
}

/// Convenience form over raw strings: tag text, release prefix, manifest text.
pub fn check_version_str(raw_tag: &str, prefix: &str, manifest_text: &str) -> Result<VersionMatch> {
    let tag = TagName::parse(raw_tag, prefix)?;
    check_version(&tag, &Manifest::parse(manifest_text))
}
