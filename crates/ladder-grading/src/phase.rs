//! Grading phases and their legal transitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a grading attempt currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradingPhase {
    /// No attempt running
    #[default]
    Idle,
    /// Learner code is executing
    RunningUserCode,
    /// Hidden verification script is executing
    RunningTestCode,
    /// Graded as passing, not yet submitted
    Passed,
    /// Learner code raised or verification failed
    Failed,
    /// The runtime itself failed
    EnvError,
    /// Passing grade is being reported
    Submitting,
    /// Server acknowledged the completion
    Done,
    /// Submission did not reach or was refused by the server
    SubmitFailed,
}

impl GradingPhase {
    /// Every phase, in pipeline order
    pub const ALL: [GradingPhase; 9] = [
        GradingPhase::Idle,
        GradingPhase::RunningUserCode,
        GradingPhase::RunningTestCode,
        GradingPhase::Passed,
        GradingPhase::Failed,
        GradingPhase::EnvError,
        GradingPhase::Submitting,
        GradingPhase::Done,
        GradingPhase::SubmitFailed,
    ];

    /// Whether an attempt ended in this phase
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GradingPhase::Failed
                | GradingPhase::EnvError
                | GradingPhase::Done
                | GradingPhase::SubmitFailed
        )
    }

    /// Whether an attempt occupies the coordinator in this phase
    #[inline]
    #[must_use]
    pub fn is_busy(self) -> bool {
        !self.is_terminal() && self != GradingPhase::Idle
    }
}

impl fmt::Display for GradingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GradingPhase::Idle => "IDLE",
            GradingPhase::RunningUserCode => "RUNNING_USER_CODE",
            GradingPhase::RunningTestCode => "RUNNING_TEST_CODE",
            GradingPhase::Passed => "PASSED",
            GradingPhase::Failed => "FAILED",
            GradingPhase::EnvError => "ENV_ERROR",
            GradingPhase::Submitting => "SUBMITTING",
            GradingPhase::Done => "DONE",
            GradingPhase::SubmitFailed => "SUBMIT_FAILED",
        };
        f.write_str(s)
    }
}

/// Rejected phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal grading transition {from} -> {to}")]
pub struct TransitionError {
    /// Phase before
    pub from: GradingPhase,
    /// Requested phase
    pub to: GradingPhase,
}

/// Validate a phase change
///
/// # Errors
/// `TransitionError` when `to` is not reachable from `from`.
pub fn validate_transition(from: GradingPhase, to: GradingPhase) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Phases reachable from `from`
///
/// Terminal phases may start a new attempt. Every phase but `Idle` may drop
/// back to `Idle` when its attempt is abandoned.
#[must_use]
pub fn allowed_transitions(from: GradingPhase) -> Vec<GradingPhase> {
    use GradingPhase::*;
    match from {
        Idle => vec![RunningUserCode],
        RunningUserCode => vec![RunningTestCode, Passed, Failed, EnvError, Idle],
        RunningTestCode => vec![Passed, Failed, EnvError, Idle],
        Passed => vec![Submitting, Idle],
        Submitting => vec![Done, SubmitFailed, Idle],
        Failed | EnvError | Done | SubmitFailed => vec![RunningUserCode, Idle],
    }
}
