//! In-memory fakes for the pipeline capabilities (testing only)
//!
//! Provides `RecordingExecutor`, `RecordingPublisher`, and `CountingCredential`
//! that satisfy the trait contracts without spawning processes, reading the
//! environment, or touching the network.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{GateError, Result};
use crate::publish::{CredentialSource, Publisher, Secret};
use crate::runner::{StageResult, ToolExecutor, ToolInvocation};
use crate::stage::{CommandVars, ReleaseStage};

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// Tool executor that records invocations and returns scripted outcomes.
///
/// Stages succeed unless told otherwise. When build outputs are configured,
/// a build invocation writes those files so artifact discovery finds them.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ToolInvocation>>,
    exit_codes: HashMap<ReleaseStage, i32>,
    errors: HashMap<ReleaseStage, String>,
    build_outputs: Vec<PathBuf>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` exit with `code`.
    pub fn exit_with(mut self, stage: ReleaseStage, code: i32) -> Self {
        self.exit_codes.insert(stage, code);
        self
    }

    /// Make `stage` fail to run at all.
    pub fn error_on(mut self, stage: ReleaseStage, message: impl Into<String>) -> Self {
        self.errors.insert(stage, message.into());
        self
    }

    /// Files the build stage creates.
    pub fn with_build_outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.build_outputs = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Every invocation seen so far.
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Stages invoked, in order.
    pub fn stages(&self) -> Vec<ReleaseStage> {
        self.calls.lock().unwrap().iter().map(|c| c.stage).collect()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<StageResult> {
        let stage = invocation.stage;
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(message) = self.errors.get(&stage) {
            return Err(GateError::tool(stage, message.clone()));
        }

        if stage == ReleaseStage::Build {
            for path in &self.build_outputs {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, b"artifact")?;
            }
        }

        let exit_code = self.exit_codes.get(&stage).copied().unwrap_or(0);
        Ok(StageResult {
            stage,
            exit_code,
            stdout: format!("ran {}", invocation.argv.join(" ")),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("{stage} failed")
            },
            duration_ms: 1,
            success: exit_code == 0,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// One recorded upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub version: String,
    pub artifacts: Vec<PathBuf>,
    pub credential: Secret,
}

/// Publisher that records uploads instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    uploads: Mutex<Vec<Upload>>,
    exit_code: i32,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload exit with `code`.
    pub fn failing(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        vars: &CommandVars,
        artifacts: &[PathBuf],
        credential: &Secret,
    ) -> Result<StageResult> {
        self.uploads.lock().unwrap().push(Upload {
            version: vars.version.clone(),
            artifacts: artifacts.to_vec(),
            credential: credential.clone(),
        });
        let success = self.exit_code == 0;
        Ok(StageResult {
            stage: ReleaseStage::Publish,
            exit_code: self.exit_code,
            stdout: String::new(),
            stderr: if success {
                String::new()
            } else {
                "HTTPError: 403 Forbidden".to_string()
            },
            duration_ms: 1,
            success,
        })
    }
}

// ---------------------------------------------------------------------------
// CountingCredential
// ---------------------------------------------------------------------------

/// Credential source that counts how often it is read.
#[derive(Debug, Default)]
pub struct CountingCredential {
    value: Option<Secret>,
    reads: AtomicUsize,
}

impl CountingCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(Secret::new(value)),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CredentialSource for CountingCredential {
    fn credential(&self) -> Option<Secret> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.value.clone()
    }

    fn describe(&self) -> String {
        "test credential".to_string()
    }
}
