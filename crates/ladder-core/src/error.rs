//! Unified error for the session layer
//!
//! Wraps the per-crate errors so callers of [`LadderSession`](crate::LadderSession)
//! handle one type, and maps each to a learner-facing message.

use crate::config::ConfigError;
use ladder_client::ClientError;
use ladder_grading::GradingError;
use ladder_progress::ProgressError;
use ladder_runtime::RuntimeInitError;
use thiserror::Error;

/// Message shown when the server cannot be reached
pub const OFFLINE_MESSAGE: &str = "Could not reach the server. Your progress was not saved; try again.";

/// Message shown when a hint purchase is refused for lack of coins
pub const INSUFFICIENT_FUNDS_MESSAGE: &str = "Not enough coins for a hint.";

/// Session error
#[derive(Debug, Error)]
pub enum LadderError {
    /// Configuration unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Embedded runtime failed to boot
    #[error(transparent)]
    Runtime(#[from] RuntimeInitError),

    /// Server call failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Progression cache failed
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Grading refused to run
    #[error(transparent)]
    Grading(#[from] GradingError),
}

impl LadderError {
    /// Whether retrying the same operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Runtime(_) => true,
            Self::Client(e) => e.is_retryable(),
            Self::Progress(e) => e.is_retryable(),
            Self::Grading(e) => match e {
                GradingError::RuntimeNotReady
                | GradingError::RuntimeInit(_)
                | GradingError::RunInProgress { .. } => true,
                GradingError::Hint(e) => e.is_retryable(),
                GradingError::Superseded { .. } | GradingError::IllegalTransition(_) => false,
            },
        }
    }

    /// The underlying client error, wherever it is wrapped
    #[must_use]
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(e)
            | Self::Progress(ProgressError::Client(e))
            | Self::Grading(GradingError::Hint(e)) => Some(e),
            _ => None,
        }
    }

    /// Text for the learner
    #[must_use]
    pub fn user_message(&self) -> String {
        if let Some(client) = self.client_error() {
            return match client {
                ClientError::InsufficientFunds { .. } => INSUFFICIENT_FUNDS_MESSAGE.to_string(),
                ClientError::Network(_) => OFFLINE_MESSAGE.to_string(),
                ClientError::NotFound(_) => "That challenge does not exist.".to_string(),
                other => format!("The server could not handle the request: {other}"),
            };
        }
        match self {
            Self::Runtime(_) | Self::Grading(GradingError::RuntimeInit(_)) => {
                "The code runner failed to start. Try again in a moment.".to_string()
            }
            Self::Grading(GradingError::RuntimeNotReady) => {
                "The code runner is still starting.".to_string()
            }
            Self::Grading(GradingError::RunInProgress { .. }) => {
                "Your previous run is still in progress.".to_string()
            }
            Self::Progress(ProgressError::UnknownChallenge { slug }) => {
                format!("Unknown challenge '{slug}'.")
            }
            other => other.to_string(),
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, LadderError>;
