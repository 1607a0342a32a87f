//! Build artifact discovery.

use crate::error::{GateError, Result};
use crate::stage::ReleaseStage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where built artifacts land.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Output directory, relative to the workspace.
    pub dir: PathBuf,

    /// Glob matched against file names inside `dir`.
    pub pattern: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            pattern: "*".to_string(),
        }
    }
}

/// Collect artifact files under `workspace`, sorted by path.
///
/// Finding nothing is a build failure: a build that produced no
/// distributables must not reach validation or upload.
pub fn collect_artifacts(workspace: &Path, config: &ArtifactConfig) -> Result<Vec<PathBuf>> {
    let dir = workspace.join(&config.dir);
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join(&config.pattern);
    let pattern = pattern.to_string_lossy();

    let entries = glob::glob(&pattern)
        .map_err(|e| GateError::Config(format!("invalid artifact pattern {pattern}: {e}")))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| GateError::Io(e.into()))?;
        if path.is_file() {
            artifacts.push(path);
        }
    }
    artifacts.sort();

    if artifacts.is_empty() {
        return Err(GateError::tool(
            ReleaseStage::Build,
            format!("no artifacts matching {pattern}"),
        ));
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_sorted_files() {
        let ws = tempfile::tempdir().unwrap();
        let dist = ws.path().join("dist");
        std::fs::create_dir_all(dist.join("nested")).unwrap();
        std::fs::write(dist.join("pkg-1.0.0.tar.gz"), b"sdist").unwrap();
        std::fs::write(dist.join("pkg-1.0.0-py3-none-any.whl"), b"wheel").unwrap();

        let artifacts = collect_artifacts(ws.path(), &ArtifactConfig::default()).unwrap();
        assert_eq!(
            artifacts,
            vec![
                dist.join("pkg-1.0.0-py3-none-any.whl"),
                dist.join("pkg-1.0.0.tar.gz"),
            ]
        );
    }

    #[test]
    fn test_pattern_filters() {
        let ws = tempfile::tempdir().unwrap();
        let dist = ws.path().join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("a.whl"), b"").unwrap();
        std::fs::write(dist.join("a.txt"), b"").unwrap();

        let config = ArtifactConfig {
            pattern: "*.whl".to_string(),
            ..Default::default()
        };
        let artifacts = collect_artifacts(ws.path(), &config).unwrap();
        assert_eq!(artifacts, vec![dist.join("a.whl")]);
    }

    #[test]
    fn test_workspace_with_glob_characters() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("pkg [rc]*?");
        let dist = ws.join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("pkg-1.0.0.tar.gz"), b"sdist").unwrap();

        let artifacts = collect_artifacts(&ws, &ArtifactConfig::default()).unwrap();
        assert_eq!(artifacts, vec![dist.join("pkg-1.0.0.tar.gz")]);
    }

    #[test]
    fn test_empty_dist_is_build_failure() {
        let ws = tempfile::tempdir().unwrap();
        let err = collect_artifacts(ws.path(), &ArtifactConfig::default()).unwrap_err();
        assert_eq!(err.stage(), Some(ReleaseStage::Build));
    }
}
