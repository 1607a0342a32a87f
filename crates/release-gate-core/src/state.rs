//! Release state machine.
//!
//! ```text
//! START -> FETCHED -> VERSION_OK -> DEPS_READY -> BUILT -> VALIDATED -> PUBLISHED
//!              \
//!               -> VERSION_MISMATCH
//! ```
//!
//! Every non-terminal state can also move to `FAILED(stage)` when the tool
//! for the next stage reports failure. There are no cycles.

use crate::error::{GateError, Result};
use crate::stage::ReleaseStage;
use serde::{Deserialize, Serialize};

/// Where a release run currently stands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    Start,
    Fetched,
    VersionOk,
    DepsReady,
    Built,
    Validated,
    Published,
    VersionMismatch,
    Failed { stage: ReleaseStage },
}

impl ReleaseState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseState::Published | ReleaseState::VersionMismatch | ReleaseState::Failed { .. }
        )
    }

    /// Whether the run ended in success.
    pub fn is_success(&self) -> bool {
        matches!(self, ReleaseState::Published)
    }

    /// The stage that runs next from this state.
    pub fn next_stage(&self) -> Option<ReleaseStage> {
        match self {
            ReleaseState::Start => Some(ReleaseStage::Fetch),
            ReleaseState::Fetched => Some(ReleaseStage::VerifyVersion),
            ReleaseState::VersionOk => Some(ReleaseStage::InstallDeps),
            ReleaseState::DepsReady => Some(ReleaseStage::Build),
            ReleaseState::Built => Some(ReleaseStage::Validate),
            ReleaseState::Validated => Some(ReleaseStage::Publish),
            _ => None,
        }
    }

    /// State reached when `stage` completes successfully.
    pub fn after(stage: ReleaseStage) -> Self {
        match stage {
            ReleaseStage::Fetch => ReleaseState::Fetched,
            ReleaseStage::VerifyVersion => ReleaseState::VersionOk,
            ReleaseStage::InstallDeps => ReleaseState::DepsReady,
            ReleaseStage::Build => ReleaseState::Built,
            ReleaseStage::Validate => ReleaseState::Validated,
            ReleaseStage::Publish => ReleaseState::Published,
        }
    }

    /// Validate and perform a transition.
    pub fn transition(self, to: ReleaseState) -> Result<ReleaseState> {
        let allowed = match (self, to) {
            (from, _) if from.is_terminal() => false,
            (ReleaseState::Fetched, ReleaseState::VersionMismatch) => true,
            (from, ReleaseState::Failed { stage }) => {
                from.next_stage() == Some(stage) && stage != ReleaseStage::VerifyVersion
            }
            (from, to) => from.next_stage().map(ReleaseState::after) == Some(to),
        };

        if allowed {
            Ok(to)
        } else {
            Err(GateError::InvalidTransition {
                current: self.to_string(),
                requested: to.to_string(),
            })
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseState::Start => f.write_str("START"),
            ReleaseState::Fetched => f.write_str("FETCHED"),
            ReleaseState::VersionOk => f.write_str("VERSION_OK"),
            ReleaseState::DepsReady => f.write_str("DEPS_READY"),
            ReleaseState::Built => f.write_str("BUILT"),
            ReleaseState::Validated => f.write_str("VALIDATED"),
            ReleaseState::Published => f.write_str("PUBLISHED"),
            ReleaseState::VersionMismatch => f.write_str("VERSION_MISMATCH"),
            ReleaseState::Failed { stage } => write!(f, "FAILED({stage})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = ReleaseState::Start;
        for stage in ReleaseStage::ALL {
            assert_eq!(state.next_stage(), Some(stage));
            state = state.transition(ReleaseState::after(stage)).unwrap();
        }
        assert_eq!(state, ReleaseState::Published);
        assert!(state.is_terminal());
        assert!(state.is_success());
    }

    #[test]
    fn test_mismatch_only_from_fetched() {
        assert!(ReleaseState::Fetched
            .transition(ReleaseState::VersionMismatch)
            .is_ok());
        for from in [
            ReleaseState::Start,
            ReleaseState::VersionOk,
            ReleaseState::Built,
            ReleaseState::Validated,
        ] {
            assert!(from.transition(ReleaseState::VersionMismatch).is_err());
        }
    }

    #[test]
    fn test_failure_must_name_next_stage() {
        let built = ReleaseState::Built;
        assert!(built
            .transition(ReleaseState::Failed {
                stage: ReleaseStage::Validate
            })
            .is_ok());
        assert!(built
            .transition(ReleaseState::Failed {
                stage: ReleaseStage::Publish
            })
            .is_err());
    }

    #[test]
    fn test_version_check_failure_is_mismatch_not_failed() {
        assert!(ReleaseState::Fetched
            .transition(ReleaseState::Failed {
                stage: ReleaseStage::VerifyVersion
            })
            .is_err());
    }

    #[test]
    fn test_no_skipping_or_cycles() {
        assert!(ReleaseState::Start.transition(ReleaseState::Built).is_err());
        assert!(ReleaseState::Built.transition(ReleaseState::Fetched).is_err());
        assert!(ReleaseState::Published
            .transition(ReleaseState::Published)
            .is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ReleaseState::VersionOk.to_string(), "VERSION_OK");
        assert_eq!(
            ReleaseState::Failed {
                stage: ReleaseStage::Build
            }
            .to_string(),
            "FAILED(build)"
        );
    }
}
