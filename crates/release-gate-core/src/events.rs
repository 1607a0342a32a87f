//! Release run event log.

use crate::stage::ReleaseStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of an event in a release run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A stage began executing.
    StageStarted { stage: ReleaseStage },

    /// A stage completed successfully.
    StageSucceeded { stage: ReleaseStage },

    /// A stage failed; the run halts.
    StageFailed { stage: ReleaseStage },

    /// A stage was disabled by configuration.
    StageSkipped { stage: ReleaseStage },

    /// The tag and manifest versions disagree; the run halts.
    VersionMismatch,
}

impl EventKind {
    /// Stage the event concerns.
    pub fn stage(&self) -> ReleaseStage {
        match self {
            EventKind::StageStarted { stage }
            | EventKind::StageSucceeded { stage }
            | EventKind::StageFailed { stage }
            | EventKind::StageSkipped { stage } => *stage,
            EventKind::VersionMismatch => ReleaseStage::VerifyVersion,
        }
    }
}

/// A single event in a release run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseEvent {
    /// Which run this event belongs to.
    pub run_id: Uuid,

    /// Monotonically increasing sequence number within the run.
    pub seq: u64,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Event classification.
    pub kind: EventKind,

    /// Event-specific payload.
    pub payload: serde_json::Value,
}

/// Append-only event log for one run.
#[derive(Debug, Clone)]
pub struct EventLog {
    run_id: Uuid,
    events: Vec<ReleaseEvent>,
}

impl EventLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            events: Vec::new(),
        }
    }

    /// Append an event, assigning the next sequence number.
    pub fn record(&mut self, kind: EventKind, payload: serde_json::Value) -> &ReleaseEvent {
        let seq = self.events.len() as u64 + 1;
        self.events.push(ReleaseEvent {
            run_id: self.run_id,
            seq,
            timestamp: Utc::now(),
            kind,
            payload,
        });
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[ReleaseEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ReleaseEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_numbers_increase() {
        let mut log = EventLog::new(Uuid::new_v4());
        log.record(
            EventKind::StageStarted {
                stage: ReleaseStage::Fetch,
            },
            json!({}),
        );
        let second = log.record(
            EventKind::StageSucceeded {
                stage: ReleaseStage::Fetch,
            },
            json!({ "exit_code": 0 }),
        );
        assert_eq!(second.seq, 2);
        assert_eq!(log.events().len(), 2);
    }

    #[test]
    fn test_event_kind_serialization() {
        let kind = EventKind::StageFailed {
            stage: ReleaseStage::Build,
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value, json!({ "type": "stage_failed", "stage": "build" }));

        let value = serde_json::to_value(EventKind::VersionMismatch).unwrap();
        assert_eq!(value, json!({ "type": "version_mismatch" }));
    }

    #[test]
    fn test_mismatch_attributed_to_verify_stage() {
        assert_eq!(
            EventKind::VersionMismatch.stage(),
            ReleaseStage::VerifyVersion
        );
    }
}
