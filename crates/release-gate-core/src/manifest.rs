//! Packaging manifest parsing.
//!
//! The declared version is read from a structured view of the manifest rather
//! than by searching the raw text, so `version="1.0.0"`, `version = '1.0.0'`
//! and `version  =  "1.0.0"` all declare the same version.
//!
//! TOML and line-oriented manifests follow one rule: `version` is read from
//! the sections in [`VERSION_TABLES`] order, and any other section is ignored.

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Tables searched for `version`, in priority order. The empty path is the
/// document root.
pub const VERSION_TABLES: &[&[&str]] = &[
    &["project"],
    &["tool", "poetry"],
    &["package"],
    &["workspace", "package"],
    &["metadata"],
    &[],
];

/// Where in the manifest the version was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionSource {
    /// TOML table path, e.g. `project` or `tool.poetry`.
    Table { path: String },

    /// 1-based line number in a line-oriented manifest.
    Line { number: usize, section: Option<String> },
}

/// A version declared by the packaging manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredVersion {
    pub value: String,
    pub source: VersionSource,
}

/// Parsed packaging manifest.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// A manifest that parsed as TOML.
    Toml(toml::Table),

    /// Anything else, kept as `(line, section, key, value)` entries.
    KeyValue(Vec<KeyValueEntry>),
}

/// One `key = value` line from a line-oriented manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntry {
    pub line: usize,
    pub section: Option<String>,
    pub key: String,
    pub value: String,
}

impl Manifest {
    /// Parse manifest text, preferring TOML.
    pub fn parse(text: &str) -> Self {
        match text.parse::<toml::Table>() {
            Ok(table) => Manifest::Toml(table),
            Err(e) => {
                debug!(error = %e, "Manifest is not TOML, falling back to key/value scan");
                Manifest::KeyValue(scan_key_values(text))
            }
        }
    }

    /// Read and parse the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| GateError::ManifestUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// The version this manifest declares, if any.
    pub fn declared_version(&self) -> Option<DeclaredVersion> {
        match self {
            Manifest::Toml(table) => toml_version(table),
            Manifest::KeyValue(entries) => key_value_version(entries),
        }
    }
}

fn toml_version(root: &toml::Table) -> Option<DeclaredVersion> {
    for path in VERSION_TABLES {
        let mut table = root;
        let mut found = true;
        for key in path.iter() {
            match table.get(*key).and_then(|v| v.as_table()) {
                Some(t) => table = t,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        if let Some(value) = table.get("version").and_then(|v| v.as_str()) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(DeclaredVersion {
                    value: value.to_string(),
                    source: VersionSource::Table {
                        path: path.join("."),
                    },
                });
            }
        }
    }
    None
}

fn key_value_version(entries: &[KeyValueEntry]) -> Option<DeclaredVersion> {
    VERSION_TABLES.iter().find_map(|path| {
        let section = (!path.is_empty()).then(|| path.join("."));
        entries
            .iter()
            .find(|e| e.section == section && e.key == "version" && !e.value.is_empty())
            .map(|e| DeclaredVersion {
                value: e.value.clone(),
                source: VersionSource::Line {
                    number: e.line,
                    section: e.section.clone(),
                },
            })
    })
}

/// Scan `key = value` lines, tracking `[section]` headers.
///
/// Comments (`#`, `;`) and blank lines are skipped. Values lose one layer of
/// matching single or double quotes.
fn scan_key_values(text: &str) -> Vec<KeyValueEntry> {
    let mut entries = Vec::new();
    let mut section: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(line[1..line.len() - 1].trim().to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        entries.push(KeyValueEntry {
            line: idx + 1,
            section: section.clone(),
            key: key.trim().to_string(),
            value: unquote(value.trim()).to_string(),
        });
    }

    entries
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyproject_project_table() {
        let text = r#"
[build-system]
requires = ["setuptools"]

[project]
name = "baselog"
version = "1.2.0"
"#;
        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "1.2.0");
        assert_eq!(
            declared.source,
            VersionSource::Table {
                path: "project".to_string()
            }
        );
    }

    #[test]
    fn test_poetry_table() {
        let text = "[tool.poetry]\nname = \"x\"\nversion = \"0.4.0\"\n";
        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "0.4.0");
        assert_eq!(
            declared.source,
            VersionSource::Table {
                path: "tool.poetry".to_string()
            }
        );
    }

    #[test]
    fn test_project_wins_over_other_tables() {
        let text = "[package]\nversion = \"9.9.9\"\n\n[project]\nversion = \"1.0.0\"\n";
        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "1.0.0");
    }

    #[test]
    fn test_formatting_variations_parse_identically() {
        for text in [
            "version=\"1.0.0\"",
            "version = '1.0.0'",
            "version   =   \"1.0.0\"   ",
        ] {
            let declared = Manifest::parse(text).declared_version().unwrap();
            assert_eq!(declared.value, "1.0.0", "input: {text}");
        }
    }

    #[test]
    fn test_dependency_versions_are_ignored() {
        let text = r#"
[project]
name = "pkg"
version = "2.0.0"

[tool.something]
version = "0.0.1"
"#;
        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "2.0.0");
    }

    #[test]
    fn test_setup_cfg_fallback() {
        let text = "[metadata]\nname = pkg\nversion = 3.1.4\n\n[options]\npackages = find:\n";
        let manifest = Manifest::parse(text);
        assert!(matches!(manifest, Manifest::KeyValue(_)));

        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "3.1.4");
        assert_eq!(
            declared.source,
            VersionSource::Line {
                number: 3,
                section: Some("metadata".to_string())
            }
        );
    }

    #[test]
    fn test_metadata_section_accepted_in_both_modes() {
        let toml_text = "[metadata]\nversion = \"1.0.0\"\n";
        let cfg_text = "[metadata]\nname = pkg\nversion = \"1.0.0\"\n";
        assert!(matches!(Manifest::parse(toml_text), Manifest::Toml(_)));
        assert!(matches!(Manifest::parse(cfg_text), Manifest::KeyValue(_)));

        for text in [toml_text, cfg_text] {
            let declared = Manifest::parse(text).declared_version().unwrap();
            assert_eq!(declared.value, "1.0.0", "input: {text}");
        }
    }

    #[test]
    fn test_unlisted_section_ignored_in_both_modes() {
        let toml_text = "[tool.other]\nversion = \"1.0.0\"\n";
        let cfg_text = "[tool.other]\nname = pkg\nversion = \"1.0.0\"\n";
        assert!(matches!(Manifest::parse(toml_text), Manifest::Toml(_)));
        assert!(matches!(Manifest::parse(cfg_text), Manifest::KeyValue(_)));

        for text in [toml_text, cfg_text] {
            assert!(Manifest::parse(text).declared_version().is_none(), "input: {text}");
        }
    }

    #[test]
    fn test_key_value_section_priority() {
        let text = "version = 0.1\n[metadata]\nname = pkg\nversion = 2.0\n";
        let declared = Manifest::parse(text).declared_version().unwrap();
        assert_eq!(declared.value, "2.0");
    }

    #[test]
    fn test_no_version() {
        let text = "[project]\nname = \"pkg\"\n";
        assert!(Manifest::parse(text).declared_version().is_none());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a\""), "a");
        assert_eq!(unquote("'a'"), "a");
        assert_eq!(unquote("\"a'"), "\"a'");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load(Path::new("/nonexistent/pyproject.toml")).unwrap_err();
        assert!(matches!(err, GateError::ManifestUnreadable { .. }));
    }
}
