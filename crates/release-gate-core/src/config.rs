//! Release gate configuration.
//!
//! Loaded from `release-gate.toml`. Every field has a default, so a missing
//! file yields the stock Python release flow (`pip` install, `build`,
//! `twine check`, `twine upload`).

use crate::artifacts::ArtifactConfig;
use crate::error::{GateError, Result};
use crate::stage::{ReleaseStage, StageConfig};
use crate::tag::DEFAULT_TAG_PREFIX;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "release-gate.toml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "RELEASE_GATE_CONFIG";

/// Per-stage overrides as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StageOverride {
    pub command: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub env: BTreeMap<String, String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Packaging manifest, relative to the workspace.
    pub manifest: PathBuf,

    /// Release prefix stripped from tags after `refs/tags/`.
    pub tag_prefix: String,

    /// Python interpreter substituted for `{python}`.
    pub python: String,

    /// Environment variable holding the upload token.
    pub credential_env: String,

    /// Build output location.
    pub artifacts: ArtifactConfig,

    /// Per-stage overrides keyed by stage name.
    pub stages: BTreeMap<String, StageOverride>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("pyproject.toml"),
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            python: "python3".to_string(),
            credential_env: "PYPI_API_TOKEN".to_string(),
            artifacts: ArtifactConfig::default(),
            stages: BTreeMap::new(),
        }
    }
}

impl ReleaseConfig {
    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ReleaseConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist and was
    /// not explicitly requested.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(GateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!(path = %path.display(), "Loaded release config");
        Ok(config)
    }

    /// Reject overrides that would break the gate's guarantees.
    pub fn validate(&self) -> Result<()> {
        for (name, o) in &self.stages {
            let stage = ReleaseStage::from_name(name)
                .ok_or_else(|| GateError::Config(format!("unknown stage '{name}'")))?;
            if o.enabled == Some(false) && !stage.can_disable() {
                return Err(GateError::Config(format!("stage '{stage}' cannot be disabled")));
            }
            if stage == ReleaseStage::VerifyVersion && o.command.is_some() {
                return Err(GateError::Config(
                    "stage 'verify_version' runs in-process and takes no command".to_string(),
                ));
            }
            if matches!(&o.command, Some(cmd) if cmd.is_empty()) {
                return Err(GateError::Config(format!("stage '{stage}' has an empty command")));
            }
        }
        if self.credential_env.trim().is_empty() {
            return Err(GateError::Config("credential_env must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolved configuration for `stage`, with commands run in `workspace`.
    pub fn stage_config(&self, stage: ReleaseStage, workspace: &Path) -> StageConfig {
        let mut config = StageConfig::from_stage(stage).in_dir(workspace);
        if let Some(o) = self.stages.get(stage.name()) {
            if let Some(command) = &o.command {
                config.command = command.clone();
            }
            if let Some(enabled) = o.enabled {
                config.enabled = enabled;
            }
            if let Some(timeout) = o.timeout_secs {
                config.timeout_secs = timeout;
            }
            config.env.extend(o.env.clone());
        }
        config
    }

    /// Resolved configuration for every stage, in run order.
    pub fn stage_plan(&self, workspace: &Path) -> Vec<StageConfig> {
        ReleaseStage::ALL
            .iter()
            .map(|stage| self.stage_config(*stage, workspace))
            .collect()
    }
}

/// Deterministic digest of an ordered stage plan.
///
/// Covers stage names, enablement and commands; environment values are left
/// out so the digest is safe to print.
pub fn plan_digest(plan: &[StageConfig]) -> String {
    let mut hasher = Sha256::new();
    for config in plan {
        hasher.update(config.stage.name().as_bytes());
        hasher.update(if config.enabled { b"+" } else { b"-" });
        for arg in &config.command {
            hasher.update(arg.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
