//! Tool stage execution.

use crate::error::{GateError, Result};
use crate::publish::Secret;
use crate::stage::ReleaseStage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Result of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    /// Stage that ran.
    pub stage: ReleaseStage,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Result for a stage that ran in-process.
    pub fn internal(stage: ReleaseStage, success: bool, message: String, duration_ms: u64) -> Self {
        let (stdout, stderr) = if success {
            (message, String::new())
        } else {
            (String::new(), message)
        };
        Self {
            stage,
            exit_code: if success { 0 } else { 1 },
            stdout,
            stderr,
            duration_ms,
            success,
        }
    }

    /// Last non-empty stderr line, for short failure messages.
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// A concrete command ready to run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub stage: ReleaseStage,
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Environment values that must never be logged.
    pub secret_env: Vec<(String, Secret)>,
    pub timeout_secs: u64,
    pub workdir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(stage: ReleaseStage, argv: Vec<String>) -> Self {
        Self {
            stage,
            argv,
            env: BTreeMap::new(),
            secret_env: Vec::new(),
            timeout_secs: 0,
            workdir: None,
        }
    }
}

/// Runs external tools on behalf of the pipeline.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// A non-zero exit is reported in the returned [`StageResult`]; `Err` is
    /// reserved for commands that could not run at all (spawn failure,
    /// timeout, empty argv).
    async fn execute(&self, invocation: &ToolInvocation) -> Result<StageResult>;
}

/// Executes tools as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<StageResult> {
        let start = Instant::now();
        let stage = invocation.stage;

        let Some((exe, args)) = invocation.argv.split_first() else {
            return Err(GateError::tool(stage, "empty command"));
        };

        debug!(stage = %stage, command = ?invocation.argv, "Spawning tool");

        let mut command = Command::new(exe);
        command
            .args(args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, secret) in &invocation.secret_env {
            command.env(key, secret.expose());
        }
        if let Some(dir) = &invocation.workdir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| GateError::tool(stage, format!("failed to spawn {exe}: {e}")))?;

        let output = if invocation.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(invocation.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                GateError::tool(
                    stage,
                    format!("timed out after {} seconds", invocation.timeout_secs),
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(StageResult {
            stage,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}
