//! Error types for release gating

use crate::stage::ReleaseStage;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;

/// Process exit code when any tool stage fails.
pub const EXIT_TOOL_FAILURE: u8 = 1;

/// Process exit code when the tag and the declared version disagree.
pub const EXIT_VERSION_MISMATCH: u8 = 2;

/// Process exit code for unusable input or configuration.
pub const EXIT_USAGE: u8 = 3;

/// Errors that can halt a release run
#[derive(Error, Debug)]
pub enum GateError {
    /// Declared version is absent or differs from the tag
    #[error("Version mismatch: tag says {tag_version:?}, manifest declares {}", declared_display(.declared))]
    VersionMismatch {
        tag_version: String,
        declared: Option<String>,
    },

    /// An external tool stage failed
    #[error("Stage '{stage}' failed: {message}")]
    ToolFailure {
        stage: ReleaseStage,
        message: String,
    },

    /// The trigger tag was empty
    #[error("Tag name must not be empty")]
    EmptyTag,

    /// The manifest could not be read
    #[error("Cannot read manifest {path}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The release state machine was driven out of order
    #[error("Invalid release state transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn declared_display(declared: &Option<String>) -> String {
    match declared {
        Some(v) => format!("{:?}", v),
        None => "no version".to_string(),
    }
}

impl GateError {
    /// Build a tool failure for `stage`.
    pub fn tool(stage: ReleaseStage, message: impl Into<String>) -> Self {
        GateError::ToolFailure {
            stage,
            message: message.into(),
        }
    }

    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            GateError::VersionMismatch { .. } => EXIT_VERSION_MISMATCH,
            GateError::ToolFailure { .. } => EXIT_TOOL_FAILURE,
            GateError::EmptyTag
            | GateError::ManifestUnreadable { .. }
            | GateError::Config(_)
            | GateError::Toml(_) => EXIT_USAGE,
            GateError::InvalidTransition { .. } | GateError::Io(_) | GateError::Json(_) => {
                EXIT_TOOL_FAILURE
            }
        }
    }

    /// Stage the error is attributed to, when there is one.
    pub fn stage(&self) -> Option<ReleaseStage> {
        match self {
            GateError::VersionMismatch { .. } => Some(ReleaseStage::VerifyVersion),
            GateError::ToolFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for release gate operations
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_exit_code() {
        let err = GateError::VersionMismatch {
            tag_version: "1.0.0".to_string(),
            declared: Some("1.0.1".to_string()),
        };
        assert_eq!(err.exit_code(), EXIT_VERSION_MISMATCH);
        assert_eq!(err.stage(), Some(ReleaseStage::VerifyVersion));
        assert!(err.to_string().contains("\"1.0.1\""));
    }

    #[test]
    fn test_mismatch_without_declared_version() {
        let err = GateError::VersionMismatch {
            tag_version: "1.0.0".to_string(),
            declared: None,
        };
        assert!(err.to_string().contains("no version"));
    }

    #[test]
    fn test_tool_failure_names_stage() {
        let err = GateError::tool(ReleaseStage::Build, "exited with code 2");
        assert_eq!(err.exit_code(), EXIT_TOOL_FAILURE);
        assert_eq!(err.to_string(), "Stage 'build' failed: exited with code 2");
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(GateError::EmptyTag.exit_code(), EXIT_USAGE);
        assert_eq!(GateError::Config("bad".into()).exit_code(), EXIT_USAGE);
    }
}
