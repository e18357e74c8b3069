//! Interpreter seam
//!
//! Implement [`RuntimeProvider`] to plug a backend into [`crate::RuntimeManager`];
//! the provider boots an [`Interpreter`] that runs one [`Program`] per call.

use crate::error::{RuntimeInitError, SandboxError};
use crate::limits::ExecutionLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Exception kind reported when the wall-clock budget is exhausted
pub const TIMEOUT_KIND: &str = "TimeoutError";

/// Exception kind reported when a stage ended without confirming completion
pub const EXIT_KIND: &str = "SystemExit";

/// One unit of work for the interpreter
///
/// Stages run in order inside a single interpreter invocation and share one
/// namespace, so a later stage sees what an earlier one defined. Each stage
/// has its own stdout capture and its own wall-clock budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    /// Source of each stage, in execution order
    pub stages: Vec<String>,
}

impl Program {
    /// Single-stage program
    #[inline]
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            stages: vec![code.into()],
        }
    }

    /// Program running `stages` back to back in one namespace
    #[must_use]
    pub fn staged<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there is nothing to run
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Exception raised by interpreted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Exception class name, e.g. `AssertionError`
    #[serde(rename = "type")]
    pub kind: String,
    /// Exception message (may be empty)
    #[serde(default)]
    pub message: String,
    /// Formatted traceback, when the backend provides one
    #[serde(default)]
    pub traceback: Option<String>,
}

impl ExceptionInfo {
    /// Create exception info
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            traceback: None,
        }
    }

    /// Budget exhaustion reported as an exception
    #[must_use]
    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            TIMEOUT_KIND,
            format!("execution exceeded the {}ms time limit", budget.as_millis()),
        )
    }

    /// Whether this is a budget exhaustion
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == TIMEOUT_KIND
    }

    /// The interpreter stopped before the stage reported completion
    #[must_use]
    pub fn exited(detail: impl fmt::Display) -> Self {
        Self::new(EXIT_KIND, format!("exited before completion ({detail})"))
    }

    /// Whether this marks a stage that never reported completion
    #[inline]
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.kind == EXIT_KIND && self.message.starts_with("exited before completion")
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Raw result of one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageRun {
    /// Everything the stage wrote to standard output
    pub stdout: String,
    /// Exception raised by the stage, if any
    pub exception: Option<ExceptionInfo>,
    /// Wall-clock time spent in the stage
    pub elapsed: Duration,
}

/// Raw result of one interpreter invocation
///
/// Holds one entry per stage that started, in order. Execution stops after
/// the first stage that raised, so only the last entry may carry an
/// exception. A stage whose completion the interpreter could not confirm is
/// reported with an exception, never as clean.
#[derive(Debug, Clone, Default)]
pub struct RawRun {
    /// Per-stage results
    pub stages: Vec<StageRun>,
    /// Wall-clock time spent in the interpreter
    pub elapsed: Duration,
}

/// A booted interpreter
///
/// Implementations must give every call a fresh namespace and every stage its
/// own output capture.
#[async_trait::async_trait]
pub trait Interpreter: Send + Sync {
    /// Stable identifier of the loaded runtime image
    fn fingerprint(&self) -> &str;

    /// Run a program; `limits.wall_clock` applies to each stage
    async fn run(&self, program: Program, limits: ExecutionLimits) -> Result<RawRun, SandboxError>;
}

/// Boots interpreters for [`crate::RuntimeManager`]
#[async_trait::async_trait]
pub trait RuntimeProvider: Send + Sync {
    /// Human-readable description used in logs
    fn describe(&self) -> String;

    /// Load and initialize a runtime
    async fn boot(&self) -> Result<Arc<dyn Interpreter>, RuntimeInitError>;
}
