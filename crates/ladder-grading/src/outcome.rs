//! Grading results

use crate::phase::GradingPhase;
use ladder_client::ClientError;
use ladder_model::SubmissionResult;
use ladder_runtime::ExceptionInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use ulid::Ulid;

/// Annotation attached when a challenge has no verification script
pub const NO_TESTS_NOTE: &str = "no tests defined";

/// Message shown when the verification script fails
pub const VERIFICATION_FAILED_MESSAGE: &str = "Your code ran, but it did not pass the checks.";

/// Sortable identifier of one grading attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Fresh id
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Local verdict on the learner's code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeOutcome {
    /// Code passed; `note` is set when nothing was actually checked
    Passed {
        /// Leniency annotation
        note: Option<&'static str>,
    },
    /// Learner code raised; shown verbatim
    UserCodeError(ExceptionInfo),
    /// Verification script raised; details stay in debug logs
    VerificationFailed,
    /// The runtime failed on the host side
    EnvError(String),
}

impl GradeOutcome {
    /// Whether the grade allows a submission
    #[inline]
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, GradeOutcome::Passed { .. })
    }

    /// Phase this outcome settles in
    #[must_use]
    pub fn phase(&self) -> GradingPhase {
        match self {
            GradeOutcome::Passed { .. } => GradingPhase::Passed,
            GradeOutcome::UserCodeError(_) | GradeOutcome::VerificationFailed => {
                GradingPhase::Failed
            }
            GradeOutcome::EnvError(_) => GradingPhase::EnvError,
        }
    }

    /// Text for the learner
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            GradeOutcome::Passed { note: Some(note) } => format!("Passed ({note})"),
            GradeOutcome::Passed { note: None } => "Passed".to_string(),
            GradeOutcome::UserCodeError(exc) => exc.to_string(),
            GradeOutcome::VerificationFailed => VERIFICATION_FAILED_MESSAGE.to_string(),
            GradeOutcome::EnvError(reason) => format!("The code runner failed: {reason}"),
        }
    }
}

/// What happened to the passing grade
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Grade did not pass; nothing was sent
    NotSubmitted,
    /// Server acknowledged (`completed` or `already_completed`)
    Acknowledged(SubmissionResult),
    /// Server answered `failed`
    Rejected(SubmissionResult),
    /// Request failed; progression untouched
    Failed(ClientError),
}

impl SubmissionOutcome {
    /// Server result, when one was received
    #[must_use]
    pub fn result(&self) -> Option<&SubmissionResult> {
        match self {
            SubmissionOutcome::Acknowledged(r) | SubmissionOutcome::Rejected(r) => Some(r),
            SubmissionOutcome::NotSubmitted | SubmissionOutcome::Failed(_) => None,
        }
    }
}

/// Full account of one grading attempt
#[derive(Debug, Clone, PartialEq)]
pub struct GradingReport {
    /// Attempt id
    pub run_id: RunId,
    /// Challenge graded
    pub slug: String,
    /// Learner-visible stdout of the user code
    pub output_lines: Vec<String>,
    /// Local verdict
    pub grade: GradeOutcome,
    /// Submission verdict
    pub submission: SubmissionOutcome,
    /// Phase the attempt ended in
    pub phase: GradingPhase,
    /// Whether the progression cache was patched
    pub cache_patched: bool,
    /// Total attempt duration
    pub elapsed: Duration,
}

impl GradingReport {
    /// Level to move to after a completed submission
    #[must_use]
    pub fn next_level_slug(&self) -> Option<&str> {
        match &self.submission {
            SubmissionOutcome::Acknowledged(result) => result.next_level_slug.as_deref(),
            _ => None,
        }
    }

    /// Whether the attempt ended with the server acknowledging completion
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == GradingPhase::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_phases() {
        assert_eq!(GradeOutcome::Passed { note: None }.phase(), GradingPhase::Passed);
        assert_eq!(GradeOutcome::VerificationFailed.phase(), GradingPhase::Failed);
        assert_eq!(
            GradeOutcome::EnvError("trap".into()).phase(),
            GradingPhase::EnvError
        );
    }

    #[test]
    fn verification_failure_message_is_generic() {
        let message = GradeOutcome::VerificationFailed.message();
        assert_eq!(message, VERIFICATION_FAILED_MESSAGE);
    }

    #[test]
    fn user_errors_are_verbatim() {
        let exc = ExceptionInfo::new("NameError", "name 'x' is not defined");
        assert_eq!(
            GradeOutcome::UserCodeError(exc).message(),
            "NameError: name 'x' is not defined"
        );
    }

    #[test]
    fn run_ids_sort_by_creation() {
        let a = RunId::new();
        std::thread::sleep(Duration::from_millis(2));
        let b = RunId::new();
        assert!(a < b);
    }
}
