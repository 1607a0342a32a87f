//! Upload capability and credential handling.
//!
//! The credential and the package index are passed into the pipeline as
//! trait objects so runs can be exercised without a real token or network.

use crate::error::{GateError, Result};
use crate::runner::{StageResult, ToolExecutor, ToolInvocation};
use crate::stage::{CommandVars, ReleaseStage, StageConfig};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable the upload command reads the token from.
pub const UPLOAD_PASSWORD_ENV: &str = "TWINE_PASSWORD";

/// An upload credential. Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// The raw value. Only hand this to the tool that needs it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Supplies the upload credential at publish time.
pub trait CredentialSource: Send + Sync {
    /// Look up the credential. `None` means it is not configured.
    fn credential(&self) -> Option<Secret>;

    /// Where the credential comes from, for error messages.
    fn describe(&self) -> String;
}

/// Reads the credential from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredential {
    fn credential(&self) -> Option<Secret> {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Secret::new)
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

/// A fixed credential, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<Secret>);

impl StaticCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Some(Secret::new(value)))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Option<Secret> {
        self.0.clone()
    }

    fn describe(&self) -> String {
        "static credential".to_string()
    }
}

/// Uploads built artifacts to a package index.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload `artifacts` authenticated with `credential`.
    async fn publish(
        &self,
        vars: &CommandVars,
        artifacts: &[PathBuf],
        credential: &Secret,
    ) -> Result<StageResult>;
}

/// Publishes by running the configured upload command.
///
/// The credential reaches the command through [`UPLOAD_PASSWORD_ENV`].
pub struct CommandPublisher {
    config: StageConfig,
    executor: Arc<dyn ToolExecutor>,
}

impl CommandPublisher {
    pub fn new(config: StageConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { config, executor }
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(
        &self,
        vars: &CommandVars,
        artifacts: &[PathBuf],
        credential: &Secret,
    ) -> Result<StageResult> {
        if artifacts.is_empty() {
            return Err(GateError::tool(ReleaseStage::Publish, "no artifacts to upload"));
        }
        let vars = CommandVars {
            artifacts: artifacts.to_vec(),
            ..vars.clone()
        };
        let mut invocation = ToolInvocation::new(ReleaseStage::Publish, self.config.render(&vars));
        invocation.env = self.config.env.clone();
        invocation.secret_env = vec![(UPLOAD_PASSWORD_ENV.to_string(), credential.clone())];
        invocation.timeout_secs = self.config.timeout_secs;
        invocation.workdir = self.config.workdir.clone();
        self.executor.execute(&invocation).await
    }
}
