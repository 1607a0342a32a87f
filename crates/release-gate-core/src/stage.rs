//! Release stage definitions and configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Stages of a release run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    /// Check out the tagged commit
    Fetch,

    /// Compare the tag version with the manifest's declared version
    VerifyVersion,

    /// Install build-time dependencies
    InstallDeps,

    /// Build distributable artifacts
    Build,

    /// Validate artifact metadata and structure
    Validate,

    /// Upload artifacts to the package index
    Publish,
}

impl ReleaseStage {
    /// All stages in the order a run executes them.
    pub const ALL: [ReleaseStage; 6] = [
        ReleaseStage::Fetch,
        ReleaseStage::VerifyVersion,
        ReleaseStage::InstallDeps,
        ReleaseStage::Build,
        ReleaseStage::Validate,
        ReleaseStage::Publish,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ReleaseStage::Fetch => "fetch",
            ReleaseStage::VerifyVersion => "verify_version",
            ReleaseStage::InstallDeps => "install_deps",
            ReleaseStage::Build => "build",
            ReleaseStage::Validate => "validate",
            ReleaseStage::Publish => "publish",
        }
    }

    /// Look up a stage by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// Whether configuration may switch this stage off.
    pub fn can_disable(&self) -> bool {
        !matches!(self, ReleaseStage::VerifyVersion | ReleaseStage::Publish)
    }

    /// Default command for the stage, with placeholders.
    ///
    /// `VerifyVersion` runs in-process and has no command.
    pub fn default_command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            ReleaseStage::Fetch => &["git", "checkout", "--quiet", "--detach", "{tag}"],
            ReleaseStage::VerifyVersion => &[],
            ReleaseStage::InstallDeps => &[
                "{python}", "-m", "pip", "install", "--upgrade", "pip", "build", "twine",
            ],
            ReleaseStage::Build => &["{python}", "-m", "build"],
            ReleaseStage::Validate => &["{python}", "-m", "twine", "check", "{artifacts}"],
            ReleaseStage::Publish => &[
                "{python}",
                "-m",
                "twine",
                "upload",
                "--non-interactive",
                "{artifacts}",
            ],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Default timeout in seconds.
    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            ReleaseStage::Fetch => 120,
            ReleaseStage::VerifyVersion => 0,
            ReleaseStage::InstallDeps => 600,
            ReleaseStage::Build => 900,
            ReleaseStage::Validate => 300,
            ReleaseStage::Publish => 600,
        }
    }
}

impl std::fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a release stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    /// Which stage this configures.
    pub stage: ReleaseStage,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,

    /// Extra environment variables for the command.
    pub env: BTreeMap<String, String>,

    /// Working directory for the command.
    pub workdir: Option<PathBuf>,
}

impl StageConfig {
    /// Create a stage configuration with the stage's defaults.
    pub fn from_stage(stage: ReleaseStage) -> Self {
        let mut env = BTreeMap::new();
        if stage == ReleaseStage::Publish {
            env.insert("TWINE_USERNAME".to_string(), "__token__".to_string());
        }
        Self {
            stage,
            command: stage.default_command(),
            timeout_secs: stage.default_timeout_secs(),
            enabled: true,
            env,
            workdir: None,
        }
    }

    /// Create a stage configuration with a custom command.
    pub fn custom(stage: ReleaseStage, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            stage,
            command,
            timeout_secs,
            enabled: true,
            env: BTreeMap::new(),
            workdir: None,
        }
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Run the command in `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Substitute placeholders and return the concrete argv.
    pub fn render(&self, vars: &CommandVars) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.command.len());
        for arg in &self.command {
            if arg == "{artifacts}" {
                argv.extend(vars.artifacts.iter().map(|p| p.to_string_lossy().into_owned()));
                continue;
            }
            argv.push(
                arg.replace("{tag}", &vars.tag)
                    .replace("{version}", &vars.version)
                    .replace("{python}", &vars.python),
            );
        }
        argv
    }
}

/// Values substituted into stage commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandVars {
    /// `{tag}`: short tag name.
    pub tag: String,

    /// `{version}`: version derived from the tag.
    pub version: String,

    /// `{python}`: interpreter used by the default commands.
    pub python: String,

    /// `{artifacts}`: one argument per built artifact.
    pub artifacts: Vec<PathBuf>,
}
