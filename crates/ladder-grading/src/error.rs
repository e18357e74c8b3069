//! Grading errors
//!
//! Only conditions that stop an attempt from producing a report are errors.
//! Failing code, runtime crashes and unreachable servers are outcomes.

use crate::outcome::RunId;
use crate::phase::TransitionError;
use ladder_client::ClientError;
use ladder_runtime::RuntimeInitError;
use thiserror::Error;

/// Grading coordinator errors
#[derive(Debug, Clone, Error)]
pub enum GradingError {
    /// `run` was called before the runtime booted
    #[error("runtime is not ready")]
    RuntimeNotReady,

    /// Booting the runtime failed
    #[error(transparent)]
    RuntimeInit(#[from] RuntimeInitError),

    /// Another attempt holds the coordinator
    #[error("grading run {run_id} is already in progress")]
    RunInProgress {
        /// Attempt currently running
        run_id: RunId,
    },

    /// The attempt was abandoned; its output was discarded
    #[error("grading run {run_id} was superseded")]
    Superseded {
        /// Abandoned attempt
        run_id: RunId,
    },

    /// Internal phase bookkeeping rejected a change
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    /// Hint purchase failed
    #[error("hint purchase failed: {0}")]
    Hint(#[from] ClientError),
}

impl GradingError {
    /// Whether the failure is a refused hint purchase for lack of funds
    #[must_use]
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, GradingError::Hint(ClientError::InsufficientFunds { .. }))
    }
}

/// Result type for grading operations
pub type Result<T> = std::result::Result<T, GradingError>;
