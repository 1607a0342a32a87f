//! Release pipeline orchestration and run recording.

use crate::artifacts::collect_artifacts;
use crate::config::{plan_digest, ReleaseConfig};
use crate::error::{GateError, Result, EXIT_SUCCESS};
use crate::events::{EventKind, EventLog, ReleaseEvent};
use crate::gate::{GateVerdict, ReleaseGate};
use crate::manifest::Manifest;
use crate::publish::{CommandPublisher, CredentialSource, EnvCredential, Publisher};
use crate::runner::{ProcessExecutor, StageResult, ToolExecutor, ToolInvocation};
use crate::stage::{CommandVars, ReleaseStage, StageConfig};
use crate::state::ReleaseState;
use crate::tag::TagName;
use crate::version_check::check_version;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Why a run halted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    /// Stage that stopped the run.
    pub stage: ReleaseStage,

    /// Error message.
    pub message: String,

    /// Process exit code for this failure.
    pub exit_code: u8,
}

impl RunFailure {
    fn from_error(stage: ReleaseStage, err: &GateError) -> Self {
        Self {
            stage: err.stage().unwrap_or(stage),
            message: err.to_string(),
            exit_code: err.exit_code(),
        }
    }
}

/// Result of a complete release run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,

    /// Trigger tag.
    pub tag: TagName,

    /// Version agreed by tag and manifest (set once the check passes).
    pub version: Option<String>,

    /// State the run ended in.
    pub final_state: ReleaseState,

    /// Results of the stages that ran.
    pub stages: Vec<StageResult>,

    /// Artifacts produced by the build stage.
    pub artifacts: Vec<PathBuf>,

    /// Recorded event log.
    pub events: Vec<ReleaseEvent>,

    /// Gate verdict over the event log.
    pub verdict: GateVerdict,

    /// Digest of the resolved stage plan.
    pub plan_digest: String,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Set when the run halted before publishing.
    pub failure: Option<RunFailure>,
}

impl RunReport {
    /// Whether the release was published and the gate passed.
    pub fn success(&self) -> bool {
        self.final_state.is_success() && self.verdict.passed
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }

    /// Whether `stage` was executed (not skipped, not unreached).
    pub fn ran(&self, stage: ReleaseStage) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        match &self.failure {
            Some(failure) => failure.exit_code,
            None if self.success() => EXIT_SUCCESS,
            None => crate::error::EXIT_TOOL_FAILURE,
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Linear release pipeline.
///
/// Tool execution, credential lookup and upload are injected so the
/// pipeline can run against fakes.
pub struct ReleasePipeline {
    config: ReleaseConfig,
    workspace: PathBuf,
    executor: Arc<dyn ToolExecutor>,
    publisher: Arc<dyn Publisher>,
    credentials: Arc<dyn CredentialSource>,
}

impl ReleasePipeline {
    pub fn new(
        config: ReleaseConfig,
        workspace: impl Into<PathBuf>,
        executor: Arc<dyn ToolExecutor>,
        publisher: Arc<dyn Publisher>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            workspace: workspace.into(),
            executor,
            publisher,
            credentials,
        }
    }

    /// Pipeline backed by child processes and an environment credential.
    pub fn with_process_tools(config: ReleaseConfig, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let executor: Arc<dyn ToolExecutor> = Arc::new(ProcessExecutor::new());
        let publisher = Arc::new(CommandPublisher::new(
            config.stage_config(ReleaseStage::Publish, &workspace),
            executor.clone(),
        ));
        let credentials = Arc::new(EnvCredential::new(config.credential_env.clone()));
        Self::new(config, workspace, executor, publisher, credentials)
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Resolved stage plan.
    pub fn plan(&self) -> Vec<StageConfig> {
        self.config.stage_plan(&self.workspace)
    }

    /// Parse `raw_tag` with the configured prefix and run the pipeline.
    pub async fn run_tag(&self, raw_tag: &str) -> Result<RunReport> {
        let tag = TagName::parse(raw_tag, &self.config.tag_prefix)?;
        self.run(&tag).await
    }

    /// Execute every stage in order, halting at the first failure.
    ///
    /// Each executed stage produces:
    /// - One `stage_started` event on start
    /// - One `stage_succeeded` event on success, or `stage_failed` /
    ///   `version_mismatch` on failure
    ///
    /// Disabled stages produce a single `stage_skipped` event. A halted run
    /// is still returned as `Ok`; the report carries the failure.
    pub async fn run(&self, tag: &TagName) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let plan = self.plan();
        let digest = plan_digest(&plan);

        info!(run_id = %run_id, tag = %tag, plan = %&digest[..12], "Starting release run");
        if !tag.is_dotted_numeric() {
            warn!(version = %tag.version, "Tag version is not dotted-numeric");
        }

        let mut log = EventLog::new(run_id);
        let mut state = ReleaseState::Start;
        let mut stage_results = Vec::new();
        let mut failure = None;
        let mut version = None;
        let mut vars = CommandVars {
            tag: tag.short_name().to_string(),
            version: tag.version.clone(),
            python: self.config.python.clone(),
            artifacts: Vec::new(),
        };

        for config in &plan {
            let stage = config.stage;

            if !config.enabled {
                // Prebuilt artifacts still have to exist when build is skipped
                if stage == ReleaseStage::Build {
                    match collect_artifacts(&self.workspace, &self.config.artifacts) {
                        Ok(artifacts) => {
                            info!(count = artifacts.len(), "Collected prebuilt artifacts");
                            vars.artifacts = artifacts;
                        }
                        Err(err) => {
                            warn!(stage = %stage, error = %err, "No prebuilt artifacts, halting release");
                            log.record(
                                EventKind::StageFailed { stage },
                                json!({ "error": err.to_string() }),
                            );
                            state = state.transition(ReleaseState::Failed { stage })?;
                            failure = Some(RunFailure::from_error(stage, &err));
                            break;
                        }
                    }
                }
                info!(stage = %stage, "Skipping disabled stage");
                log.record(EventKind::StageSkipped { stage }, json!({}));
                state = state.transition(ReleaseState::after(stage))?;
                continue;
            }

            info!(stage = %stage, "Executing stage");
            log.record(
                EventKind::StageStarted { stage },
                json!({
                    "command": &config.command,
                    "timeout_secs": config.timeout_secs,
                }),
            );

            let outcome = match stage {
                ReleaseStage::VerifyVersion => self.verify_version(tag).map(|(result, matched)| {
                    version = Some(matched);
                    result
                }),
                ReleaseStage::Publish => self.publish(&vars).await,
                _ => self.run_tool(config, &vars).await,
            };

            // Non-zero exits come back as results; fold them into errors so
            // there is a single failure path
            let outcome = match outcome {
                Ok(result) if result.passed() => Ok(result),
                Ok(result) => {
                    let detail = result
                        .stderr_tail()
                        .map(|l| format!(": {l}"))
                        .unwrap_or_default();
                    let err = GateError::tool(
                        stage,
                        format!("exited with code {}{}", result.exit_code, detail),
                    );
                    stage_results.push(result);
                    Err(err)
                }
                Err(e) => {
                    stage_results.push(StageResult::internal(
                        stage,
                        false,
                        e.to_string(),
                        0,
                    ));
                    Err(e)
                }
            };

            let outcome = match outcome {
                Ok(mut result) if stage == ReleaseStage::Build => {
                    match collect_artifacts(&self.workspace, &self.config.artifacts) {
                        Ok(artifacts) => {
                            info!(count = artifacts.len(), "Collected build artifacts");
                            vars.artifacts = artifacts;
                            Ok(result)
                        }
                        Err(e) => {
                            result.success = false;
                            result.stderr.push_str(&e.to_string());
                            stage_results.push(result);
                            Err(e)
                        }
                    }
                }
                other => other,
            };

            match outcome {
                Ok(result) => {
                    log.record(
                        EventKind::StageSucceeded { stage },
                        json!({
                            "exit_code": result.exit_code,
                            "duration_ms": result.duration_ms,
                        }),
                    );
                    stage_results.push(result);
                    state = state.transition(ReleaseState::after(stage))?;
                }
                Err(err) => {
                    warn!(stage = %stage, error = %err, "Stage failed, halting release");
                    state = match &err {
                        GateError::VersionMismatch {
                            tag_version,
                            declared,
                        } => {
                            log.record(
                                EventKind::VersionMismatch,
                                json!({
                                    "tag_version": tag_version,
                                    "declared": declared,
                                }),
                            );
                            state.transition(ReleaseState::VersionMismatch)?
                        }
                        GateError::ManifestUnreadable { .. } => {
                            log.record(
                                EventKind::VersionMismatch,
                                json!({
                                    "tag_version": &tag.version,
                                    "declared": null,
                                    "error": err.to_string(),
                                }),
                            );
                            state.transition(ReleaseState::VersionMismatch)?
                        }
                        _ => {
                            log.record(
                                EventKind::StageFailed { stage },
                                json!({ "error": err.to_string() }),
                            );
                            state.transition(ReleaseState::Failed { stage })?
                        }
                    };
                    failure = Some(RunFailure::from_error(stage, &err));
                    break;
                }
            }
        }

        let events = log.into_events();
        let verdict = ReleaseGate::evaluate(&events);
        let duration_ms = start.elapsed().as_millis() as u64;

        if state.is_success() {
            info!(run_id = %run_id, state = %state, "Release run completed successfully");
        } else {
            info!(run_id = %run_id, state = %state, "Release run failed");
        }

        Ok(RunReport {
            run_id,
            tag: tag.clone(),
            version,
            final_state: state,
            stages: stage_results,
            artifacts: vars.artifacts,
            events,
            verdict,
            plan_digest: digest,
            duration_ms,
            failure,
        })
    }

    fn verify_version(&self, tag: &TagName) -> Result<(StageResult, String)> {
        let start = Instant::now();
        let manifest_path = self.workspace.join(&self.config.manifest);
        let manifest = Manifest::load(&manifest_path)?;
        let matched = check_version(tag, &manifest)?;
        info!(version = %matched.version(), manifest = %manifest_path.display(), "Tag matches declared version");
        let result = StageResult::internal(
            ReleaseStage::VerifyVersion,
            true,
            format!("version {} matches tag {}", matched.version(), tag),
            start.elapsed().as_millis() as u64,
        );
        Ok((result, matched.version().to_string()))
    }

    async fn run_tool(&self, config: &StageConfig, vars: &CommandVars) -> Result<StageResult> {
        let mut invocation = ToolInvocation::new(config.stage, config.render(vars));
        invocation.env = config.env.clone();
        invocation.timeout_secs = config.timeout_secs;
        invocation.workdir = config.workdir.clone();
        self.executor.execute(&invocation).await
    }

    async fn publish(&self, vars: &CommandVars) -> Result<StageResult> {
        let credential = self.credentials.credential().ok_or_else(|| {
            GateError::tool(
                ReleaseStage::Publish,
                format!("no upload credential in {}", self.credentials.describe()),
            )
        })?;
        self.publisher
            .publish(vars, &vars.artifacts, &credential)
            .await
    }
}
