//! Release gate evaluation for pass/fail criteria.

use crate::events::{EventKind, ReleaseEvent};
use crate::stage::ReleaseStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Release gate evaluation rules.
pub struct ReleaseGate;

impl ReleaseGate {
    /// Evaluate a run's event log.
    ///
    /// Gate rule:
    /// - A `version_mismatch` event fails the gate
    /// - Any `stage_failed` event fails the gate
    /// - Every started stage must have succeeded
    /// - `publish` must have succeeded; a run that stopped early never passes
    pub fn evaluate(events: &[ReleaseEvent]) -> GateVerdict {
        let mut violations = Vec::new();

        let mut started = BTreeSet::new();
        let mut succeeded = BTreeSet::new();
        let mut failed = BTreeSet::new();

        for event in events {
            match &event.kind {
                EventKind::StageStarted { stage } => {
                    started.insert(*stage);
                }
                EventKind::StageSucceeded { stage } => {
                    succeeded.insert(*stage);
                }
                EventKind::StageFailed { stage } => {
                    failed.insert(*stage);
                    let error = event.payload["error"].as_str().unwrap_or("unknown error");
                    violations.push(format!("Stage '{}' failed: {}", stage, error));
                }
                EventKind::VersionMismatch => {
                    let tag = event.payload["tag_version"].as_str().unwrap_or("?");
                    let declared = event.payload["declared"].as_str().unwrap_or("none");
                    violations.push(format!(
                        "Stage '{}' failed: tag version '{}' does not match declared version '{}'",
                        event.kind.stage(),
                        tag,
                        declared
                    ));
                }
                EventKind::StageSkipped { .. } => {}
            }
        }

        // Started but neither succeeded nor reported as failed
        for stage in &started {
            if !succeeded.contains(stage)
                && !failed.contains(stage)
                && *stage != ReleaseStage::VerifyVersion
            {
                violations.push(format!("Stage '{}' was started but never completed", stage));
            }
        }

        if violations.is_empty() && !succeeded.contains(&ReleaseStage::Publish) {
            violations.push("Run ended before publish".to_string());
        }

        let passed = violations.is_empty();
        let message = if passed {
            "Release published".to_string()
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
