//! Grading coordinator
//!
//! One attempt at a time:
//!
//! ```text
//! IDLE -> RUNNING_USER_CODE -> RUNNING_TEST_CODE -> PASSED -> SUBMITTING -> DONE
//!               |                     |                            \
//!               +-> FAILED / ENV_ERROR +-> FAILED / ENV_ERROR        +-> SUBMIT_FAILED
//! ```
//!
//! User code and verification are two stages of one [`ExecutionScope`]: a
//! single interpreter invocation, so the verification script sees the
//! learner's definitions and the learner's code runs exactly once. Each stage
//! has its own budget and output capture. Only a passing grade is ever
//! submitted, and only an acknowledged submission patches the cache.

use crate::error::{GradingError, Result};
use crate::hints;
use crate::outcome::{GradeOutcome, GradingReport, RunId, SubmissionOutcome, NO_TESTS_NOTE};
use crate::phase::{validate_transition, GradingPhase};
use ladder_client::ChallengeApi;
use ladder_model::{Challenge, HintResult, SubmissionPayload};
use ladder_progress::ProgressionCache;
use ladder_runtime::{
    ExecutionOutput, ExecutionScope, RuntimeHandle, RuntimeManager, Sandbox,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Releases the run slot when the attempt ends, unless it was abandoned
struct RunSlot<'a> {
    slot: &'a Mutex<Option<RunId>>,
    run_id: RunId,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if *slot == Some(self.run_id) {
            *slot = None;
        }
    }
}

/// Sequences execution, verification and submission for one challenge view
pub struct GradingCoordinator {
    runtime: RuntimeManager,
    sandbox: Sandbox,
    api: Arc<dyn ChallengeApi>,
    cache: ProgressionCache,
    phase: watch::Sender<GradingPhase>,
    active: Mutex<Option<RunId>>,
    generation: AtomicU64,
}

impl GradingCoordinator {
    /// Create an idle coordinator
    #[must_use]
    pub fn new(
        runtime: RuntimeManager,
        sandbox: Sandbox,
        api: Arc<dyn ChallengeApi>,
        cache: ProgressionCache,
    ) -> Self {
        let (phase, _) = watch::channel(GradingPhase::Idle);
        Self {
            runtime,
            sandbox,
            api,
            cache,
            phase,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Boot the runtime so that `run` is accepted
    ///
    /// # Errors
    /// `GradingError::RuntimeInit` when the boot fails; a later call retries.
    pub async fn prepare(&self) -> Result<RuntimeHandle> {
        Ok(self.runtime.ensure_runtime().await?)
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> GradingPhase {
        *self.phase.borrow()
    }

    /// Observe phase changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GradingPhase> {
        self.phase.subscribe()
    }

    /// Attempt currently running
    #[must_use]
    pub fn active_run(&self) -> Option<RunId> {
        *self.active.lock()
    }

    /// Abandon the running attempt
    ///
    /// The attempt stops at its next step, discards its output and returns
    /// `GradingError::Superseded`. Returns the abandoned id.
    pub fn abandon(&self) -> Option<RunId> {
        let run_id = self.active.lock().take()?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.phase.send_if_modified(|phase| {
            if *phase == GradingPhase::Idle {
                return false;
            }
            *phase = GradingPhase::Idle;
            true
        });
        info!(run_id = %run_id, "grading run abandoned");
        Some(run_id)
    }

    /// Grade `code` against `challenge` and submit a passing result
    ///
    /// # Errors
    /// - `RuntimeNotReady` before the runtime has booted
    /// - `RunInProgress` while another attempt is running
    /// - `Superseded` when [`abandon`](Self::abandon) was called meanwhile
    ///
    /// Failing code, runtime crashes and submission failures are reported in
    /// the returned [`GradingReport`].
    pub async fn run(&self, challenge: &Challenge, code: &str) -> Result<GradingReport> {
        let handle = self.runtime.handle().ok_or(GradingError::RuntimeNotReady)?;

        let run_id = RunId::new();
        let generation = {
            let mut active = self.active.lock();
            if let Some(current) = *active {
                return Err(GradingError::RunInProgress { run_id: current });
            }
            *active = Some(run_id);
            self.generation.load(Ordering::SeqCst)
        };
        let _slot = RunSlot {
            slot: &self.active,
            run_id,
        };

        let span = info_span!("grading", run_id = %run_id, slug = %challenge.slug);
        self.attempt(&handle, challenge, code, run_id, generation)
            .instrument(span)
            .await
    }

    /// Buy a hint for `slug` and record it in the cache
    ///
    /// # Errors
    /// `GradingError::Hint` when the server refuses or cannot be reached.
    pub async fn purchase_hint(&self, slug: &str) -> Result<HintResult> {
        hints::purchase_hint(self.api.as_ref(), &self.cache, slug).await
    }

    async fn attempt(
        &self,
        handle: &RuntimeHandle,
        challenge: &Challenge,
        code: &str,
        run_id: RunId,
        generation: u64,
    ) -> Result<GradingReport> {
        let started = Instant::now();
        if self.phase().is_busy() {
            // Left behind by an attempt whose future was dropped
            self.phase.send_replace(GradingPhase::Idle);
        }
        self.enter(run_id, generation, GradingPhase::RunningUserCode)?;

        let script = challenge.verification_script();
        let mut scope: ExecutionScope = self.sandbox.scope(challenge.time_limit).stage(code);
        if let Some(script) = script {
            scope = scope.stage(script);
        }
        let outputs = self.sandbox.run(handle, &scope).await;
        self.ensure_current(run_id, generation)?;

        let (output_lines, grade) = match outputs {
            Err(e) => {
                warn!(error = %e, "runtime failed while running user code");
                (Vec::new(), GradeOutcome::EnvError(e.to_string()))
            }
            Ok(outputs) => {
                let mut outputs = outputs.into_iter();
                match outputs.next() {
                    None => (
                        Vec::new(),
                        GradeOutcome::EnvError("user code produced no result".to_string()),
                    ),
                    Some(user) => {
                        let grade = match user.error {
                            Some(exc) => {
                                info!(kind = %exc.kind, "user code raised");
                                GradeOutcome::UserCodeError(exc)
                            }
                            None => {
                                let verification = outputs.next();
                                self.verify(script.is_some(), verification, run_id, generation)?
                            }
                        };
                        (user.output_lines, grade)
                    }
                }
            }
        };

        self.enter(run_id, generation, grade.phase())?;

        let (submission, cache_patched) = if grade.is_passed() {
            self.submit(&challenge.slug, run_id, generation).await?
        } else {
            (SubmissionOutcome::NotSubmitted, false)
        };

        let report = GradingReport {
            run_id,
            slug: challenge.slug.clone(),
            output_lines,
            grade,
            submission,
            phase: self.phase(),
            cache_patched,
            elapsed: started.elapsed(),
        };
        info!(
            phase = %report.phase,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "grading run finished"
        );
        Ok(report)
    }

    fn verify(
        &self,
        has_script: bool,
        verification: Option<ExecutionOutput>,
        run_id: RunId,
        generation: u64,
    ) -> Result<GradeOutcome> {
        if !has_script {
            info!("no verification script; passing");
            return Ok(GradeOutcome::Passed {
                note: Some(NO_TESTS_NOTE),
            });
        }

        self.enter(run_id, generation, GradingPhase::RunningTestCode)?;
        Ok(match verification {
            Some(output) => match output.error {
                None => GradeOutcome::Passed { note: None },
                Some(exc) => {
                    debug!(
                        kind = %exc.kind,
                        message = %exc.message,
                        hidden_lines = output.output_lines.len(),
                        "verification failed"
                    );
                    GradeOutcome::VerificationFailed
                }
            },
            None => {
                warn!("verification stage did not run");
                GradeOutcome::EnvError("verification did not run".to_string())
            }
        })
    }

    async fn submit(
        &self,
        slug: &str,
        run_id: RunId,
        generation: u64,
    ) -> Result<(SubmissionOutcome, bool)> {
        self.enter(run_id, generation, GradingPhase::Submitting)?;
        let response = self.api.submit(slug, &SubmissionPayload::passed()).await;

        // The server has recorded an acknowledged result even if this attempt
        // was abandoned meanwhile; the cache must reflect it either way.
        let patched = match &response {
            Ok(result) if result.status.is_acknowledged() => {
                match self.cache.apply_submission_result(slug, result) {
                    Ok(changed) => changed,
                    Err(e) => {
                        warn!(error = %e, "submission acknowledged but cache not patched");
                        false
                    }
                }
            }
            _ => false,
        };
        self.ensure_current(run_id, generation)?;

        match response {
            Ok(result) if result.status.is_acknowledged() => {
                self.enter(run_id, generation, GradingPhase::Done)?;
                info!(
                    stars = result.stars,
                    xp = result.xp_earned,
                    next = ?result.next_level_slug,
                    "submission acknowledged"
                );
                Ok((SubmissionOutcome::Acknowledged(result), patched))
            }
            Ok(result) => {
                self.enter(run_id, generation, GradingPhase::SubmitFailed)?;
                warn!(status = ?result.status, "submission rejected by server");
                Ok((SubmissionOutcome::Rejected(result), false))
            }
            Err(e) => {
                self.enter(run_id, generation, GradingPhase::SubmitFailed)?;
                warn!(error = %e, retryable = e.is_retryable(), "submission failed");
                Ok((SubmissionOutcome::Failed(e), false))
            }
        }
    }

    fn ensure_current(&self, run_id: RunId, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            debug!("superseded; discarding output");
            Err(GradingError::Superseded { run_id })
        }
    }

    fn enter(&self, run_id: RunId, generation: u64, next: GradingPhase) -> Result<()> {
        self.ensure_current(run_id, generation)?;
        let from = self.phase();
        validate_transition(from, next)?;
        self.phase.send_replace(next);
        debug!(from = %from, to = %next, "grading phase");
        Ok(())
    }
}

impl fmt::Debug for GradingCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingCoordinator")
            .field("phase", &self.phase())
            .field("active_run", &self.active_run())
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}
