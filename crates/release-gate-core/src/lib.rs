//! Release Gate - tag-triggered package release pipeline
//!
//! Provides:
//! - Tag/version consistency checks against a packaging manifest
//! - A linear release pipeline (fetch, verify, install, build, validate, publish)
//! - An event log and gate verdict for every run
//!
//! Tool execution, credential lookup and upload are injected through
//! [`ToolExecutor`], [`CredentialSource`] and [`Publisher`].

pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod fakes;
pub mod gate;
pub mod manifest;
pub mod pipeline;
pub mod publish;
pub mod runner;
pub mod stage;
pub mod state;
pub mod tag;
pub mod telemetry;
pub mod version_check;

// Re-export key types
pub use artifacts::{collect_artifacts, ArtifactConfig};
pub use config::{plan_digest, ReleaseConfig, StageOverride, CONFIG_ENV, DEFAULT_CONFIG_FILE};
pub use error::{
    GateError, Result, EXIT_SUCCESS, EXIT_TOOL_FAILURE, EXIT_USAGE, EXIT_VERSION_MISMATCH,
};
pub use events::{EventKind, EventLog, ReleaseEvent};
pub use gate::{GateVerdict, ReleaseGate};
pub use manifest::{DeclaredVersion, Manifest, VersionSource};
pub use pipeline::{ReleasePipeline, RunFailure, RunReport};
pub use publish::{
    CommandPublisher, CredentialSource, EnvCredential, Publisher, Secret, StaticCredential,
};
pub use runner::{ProcessExecutor, StageResult, ToolExecutor, ToolInvocation};
pub use stage::{CommandVars, ReleaseStage, StageConfig};
pub use state::ReleaseState;
pub use tag::{resolve_trigger_tag, resolve_trigger_tag_with, TagName};
pub use telemetry::{init_logging, install_panic_hook, LogConfig, LogHandle};
pub use version_check::{check_version, check_version_str, VersionMatch};
