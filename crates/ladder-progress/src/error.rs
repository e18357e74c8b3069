//! Progression cache errors

use ladder_client::ClientError;
use thiserror::Error;

/// Progression cache errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProgressError {
    /// The authoritative fetch failed; the cache was left untouched
    #[error("progression fetch failed: {0}")]
    Client(#[from] ClientError),

    /// Local mutation named a challenge the cache does not hold
    #[error("unknown challenge: {slug}")]
    UnknownChallenge {
        /// Requested slug
        slug: String,
    },
}

impl ProgressError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ProgressError::Client(e) => e.is_retryable(),
            ProgressError::UnknownChallenge { .. } => false,
        }
    }
}

/// Result type for progression operations
pub type Result<T> = std::result::Result<T, ProgressError>;
