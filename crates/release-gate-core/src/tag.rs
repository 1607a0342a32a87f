//! Release tag parsing.
//!
//! A trigger tag may arrive as a full ref (`refs/tags/v1.2.3`) or a short
//! name (`v1.2.3`, `1.2.3`). The version component is whatever remains once
//! the ref prefix and the release prefix are removed. Prefixes are matched by
//! content, never by length, and both are optional.

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};

/// Ref namespace git uses for tags.
pub const REF_TAGS_PREFIX: &str = "refs/tags/";

/// Release prefix stripped from tags when none is configured.
pub const DEFAULT_TAG_PREFIX: &str = "v";

/// A trigger tag and the version derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagName {
    /// Tag as supplied by the trigger.
    pub raw: String,

    /// Version component after prefix stripping.
    pub version: String,
}

impl TagName {
    /// Parse `raw`, stripping `refs/tags/` and then `prefix` when present.
    ///
    /// The version component is not validated. `vNext` parses to `Next`,
    /// which simply never matches a declared version.
    pub fn parse(raw: &str, prefix: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::EmptyTag);
        }

        let short = trimmed.strip_prefix(REF_TAGS_PREFIX).unwrap_or(trimmed);
        if short.is_empty() {
            return Err(GateError::EmptyTag);
        }

        // A bare prefix leaves an empty version, which matches nothing
        let version = if prefix.is_empty() {
            short
        } else {
            short.strip_prefix(prefix).unwrap_or(short)
        };

        Ok(Self {
            raw: trimmed.to_string(),
            version: version.to_string(),
        })
    }

    /// Tag name without the `refs/tags/` namespace.
    pub fn short_name(&self) -> &str {
        self.raw.strip_prefix(REF_TAGS_PREFIX).unwrap_or(&self.raw)
    }

    /// Whether the version component is dotted-numeric (`1`, `1.2`, `1.2.3`, ...).
    pub fn is_dotted_numeric(&self) -> bool {
        self.version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Resolve the trigger tag from an explicit value or the CI environment.
///
/// Order: `explicit`, then `GITHUB_REF_NAME` when `GITHUB_REF_TYPE` is `tag`,
/// then `GITHUB_REF` when it points into `refs/tags/`. Branch pushes resolve
/// to nothing.
pub fn resolve_trigger_tag(explicit: Option<&str>) -> Option<String> {
    resolve_trigger_tag_with(explicit, |key| std::env::var(key).ok())
}

/// [`resolve_trigger_tag`] over an arbitrary variable lookup.
pub fn resolve_trigger_tag_with<F>(explicit: Option<&str>, var: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(tag) = explicit.filter(|t| !t.trim().is_empty()) {
        return Some(tag.to_string());
    }
    if var("GITHUB_REF_TYPE").as_deref() == Some("tag") {
        if let Some(name) = var("GITHUB_REF_NAME").filter(|n| !n.trim().is_empty()) {
            return Some(name);
        }
    }
    var("GITHUB_REF").filter(|r| r.starts_with(REF_TAGS_PREFIX) && r.len() > REF_TAGS_PREFIX.len())
}
