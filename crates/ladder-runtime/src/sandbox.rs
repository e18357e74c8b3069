//! Execution sandbox
//!
//! Runs code in the embedded runtime and returns its stdout lines plus any
//! exception it raised. Capture is per invocation: each call hands the
//! interpreter a fresh program and receives its own output buffers.
//!
//! An [`ExecutionScope`] groups stages that must see each other's
//! definitions. They run back to back in one interpreter invocation, so
//! nothing is executed twice.

use crate::error::SandboxError;
use crate::interpreter::{ExceptionInfo, Program, StageRun};
use crate::limits::ExecutionLimits;
use crate::manager::RuntimeHandle;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Slack the host watchdog allows past the wall-clock budget
const WATCHDOG_GRACE: Duration = Duration::from_secs(1);

/// Result of one sandbox invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Standard output, one entry per line, in write order
    pub output_lines: Vec<String>,
    /// Exception raised by the code
    pub error: Option<ExceptionInfo>,
    /// Time spent in the interpreter
    pub elapsed: Duration,
}

impl ExecutionOutput {
    /// Whether the code ran to completion without raising
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

impl From<StageRun> for ExecutionOutput {
    fn from(run: StageRun) -> Self {
        Self {
            output_lines: run.stdout.lines().map(str::to_owned).collect(),
            error: run.exception,
            elapsed: run.elapsed,
        }
    }
}

/// Stages sharing one namespace
///
/// Every stage gets the scope's wall-clock budget. A stage runs only when
/// all stages before it completed cleanly.
#[derive(Debug, Clone, Default)]
pub struct ExecutionScope {
    stages: Vec<String>,
    limits: ExecutionLimits,
}

impl ExecutionScope {
    /// Empty scope with default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty scope with the given limits
    #[inline]
    #[must_use]
    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self {
            stages: Vec::new(),
            limits,
        }
    }

    /// Append a stage
    #[must_use]
    pub fn stage(mut self, code: impl Into<String>) -> Self {
        self.stages.push(code.into());
        self
    }

    /// Limits applied to each stage
    #[inline]
    #[must_use]
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stages.len()
    }
}

/// Stateless executor over a [`RuntimeHandle`]
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    limits: ExecutionLimits,
}

impl Sandbox {
    /// Create sandbox with default limits for new scopes
    #[inline]
    #[must_use]
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    /// Default limits
    #[inline]
    #[must_use]
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// New scope using this sandbox's limits, adjusted by a challenge time limit
    #[must_use]
    pub fn scope(&self, time_limit_secs: Option<u32>) -> ExecutionScope {
        ExecutionScope::with_limits(self.limits.with_time_limit_secs(time_limit_secs))
    }

    /// Run `code` in a fresh namespace
    ///
    /// # Errors
    /// `SandboxError` only for host-side failures; exceptions raised by the
    /// code are returned in [`ExecutionOutput::error`].
    pub async fn execute(
        &self,
        handle: &RuntimeHandle,
        code: &str,
    ) -> Result<ExecutionOutput, SandboxError> {
        let scope = ExecutionScope::with_limits(self.limits).stage(code);
        self.run(handle, &scope)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SandboxError::MalformedReport("no stage output".into()))
    }

    /// Run every stage of `scope` in one invocation
    ///
    /// Returns one output per stage that ran. The list stops at the first
    /// stage that raised, overran its budget or never confirmed completion.
    ///
    /// # Errors
    /// `SandboxError` for host-side failures.
    pub async fn run(
        &self,
        handle: &RuntimeHandle,
        scope: &ExecutionScope,
    ) -> Result<Vec<ExecutionOutput>, SandboxError> {
        if scope.stages.is_empty() {
            return Ok(Vec::new());
        }
        let limits = *scope.limits();
        let budget = limits.invocation_budget(scope.depth());
        let program = Program::staged(scope.stages.iter().cloned());
        let started = Instant::now();

        let stages = match tokio::time::timeout(
            budget + WATCHDOG_GRACE,
            handle.interpreter().run(program, limits),
        )
        .await
        {
            Ok(result) => result?.stages,
            Err(_) => {
                // The guest's own deadline should have fired first; the
                // stage that hung is unknown, so the first one takes the blame
                warn!(budget_ms = budget.as_millis() as u64, "sandbox watchdog fired");
                vec![StageRun {
                    stdout: String::new(),
                    exception: Some(ExceptionInfo::timeout(limits.wall_clock)),
                    elapsed: started.elapsed(),
                }]
            }
        };

        let outputs = settle(stages, scope.depth(), limits.wall_clock);
        debug!(
            stages = scope.depth(),
            ran = outputs.len(),
            raised = outputs.last().is_some_and(|o| !o.is_clean()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sandbox invocation finished"
        );
        Ok(outputs)
    }
}

/// Hold every backend to the stage contract
///
/// A missing report after a clean stage means the interpreter stopped
/// early; a clean stage that overran `budget` is a timeout.
fn settle(runs: Vec<StageRun>, expected: usize, budget: Duration) -> Vec<ExecutionOutput> {
    let mut runs = runs.into_iter();
    let mut outputs = Vec::with_capacity(expected);
    for _ in 0..expected {
        let mut output = match runs.next() {
            Some(run) => ExecutionOutput::from(run),
            None => ExecutionOutput {
                error: Some(ExceptionInfo::exited("no stage report")),
                ..ExecutionOutput::default()
            },
        };
        if output.is_clean() && output.elapsed > budget {
            output.error = Some(ExceptionInfo::timeout(budget));
        }
        let stop = !output.is_clean();
        outputs.push(output);
        if stop {
            break;
        }
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(ms: u64) -> StageRun {
        StageRun {
            stdout: "ok\n".into(),
            exception: None,
            elapsed: Duration::from_millis(ms),
        }
    }

    #[test]
    fn missing_report_is_not_clean() {
        let outputs = settle(vec![clean(1)], 2, Duration::from_secs(5));

        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].is_clean());
        assert!(outputs[1].error.as_ref().unwrap().is_exit());
    }

    #[test]
    fn overrun_stage_times_out_and_stops() {
        let outputs = settle(vec![clean(6000), clean(1)], 2, Duration::from_secs(5));

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output_lines, ["ok"]);
        assert!(outputs[0].error.as_ref().unwrap().is_timeout());
    }

    #[test]
    fn reports_after_an_exception_are_dropped() {
        let raised = StageRun {
            exception: Some(ExceptionInfo::new("ValueError", "")),
            ..clean(1)
        };
        let outputs = settle(vec![raised, clean(1)], 2, Duration::from_secs(5));
        assert_eq!(outputs.len(), 1);
    }
}
