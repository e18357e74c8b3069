use async_trait::async_trait;
use ladder_client::{ChallengeApi, ClientError};
use ladder_grading::{
    GradeOutcome, GradingCoordinator, GradingError, GradingPhase, SubmissionOutcome, NO_TESTS_NOTE,
};
use ladder_model::{
    CertificateEligibility, CertificateRecord, Challenge, ChallengeStatus, HintResult,
    SubmissionPayload, SubmissionResult, SubmissionStatus,
};
use ladder_progress::ProgressionCache;
use ladder_runtime::{RuntimeManager, Sandbox, SandboxError};
use ladder_test_utils::{challenge, ladder, scripted_runtime, FakeApi, ScriptedProvider};
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Api {}

    #[async_trait]
    impl ChallengeApi for Api {
        async fn list_challenges(&self) -> ladder_client::Result<Vec<Challenge>>;
        async fn get_challenge(&self, slug: &str) -> ladder_client::Result<Challenge>;
        async fn submit(
            &self,
            slug: &str,
            payload: &SubmissionPayload,
        ) -> ladder_client::Result<SubmissionResult>;
        async fn purchase_hint(&self, slug: &str) -> ladder_client::Result<HintResult>;
        async fn certificate_eligibility(&self) -> ladder_client::Result<CertificateEligibility>;
        async fn my_certificate(&self) -> ladder_client::Result<Option<CertificateRecord>>;
    }
}

struct Harness {
    coordinator: Arc<GradingCoordinator>,
    cache: ProgressionCache,
    provider: Arc<ScriptedProvider>,
}

async fn harness(api: Arc<dyn ChallengeApi>) -> Harness {
    let (runtime, provider) = scripted_runtime();
    runtime.ensure_runtime().await.unwrap();
    let cache = ProgressionCache::new(api.clone());
    cache.fetch_all(false).await.unwrap();
    let coordinator = GradingCoordinator::new(runtime, Sandbox::default(), api, cache.clone());
    Harness {
        coordinator: Arc::new(coordinator),
        cache,
        provider,
    }
}

fn graded_ladder(test_code: &str) -> Vec<Challenge> {
    let mut challenges = ladder(3);
    challenges[0] = challenges[0].clone().with_test_code(test_code);
    challenges
}

#[tokio::test]
async fn failing_verification_is_not_submitted() {
    let mut api = MockApi::new();
    api.expect_list_challenges()
        .times(1)
        .returning(|| Ok(graded_ladder("assert 1 == 2")));
    api.expect_submit().never();
    let h = harness(Arc::new(api)).await;
    let before = h.cache.snapshot();
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "print(\"hi\")").await.unwrap();

    assert_eq!(report.output_lines, ["hi"]);
    assert_eq!(report.grade, GradeOutcome::VerificationFailed);
    assert_eq!(report.submission, SubmissionOutcome::NotSubmitted);
    assert_eq!(report.phase, GradingPhase::Failed);
    assert!(!report.cache_patched);
    assert!(Arc::ptr_eq(&before, &h.cache.snapshot()));
}

#[tokio::test]
async fn passing_solution_is_submitted_and_patched() {
    let api = Arc::new(FakeApi::new(graded_ladder("assert f() == 42")));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h
        .coordinator
        .run(&level, "def f():\n    return 42")
        .await
        .unwrap();

    assert_eq!(report.grade, GradeOutcome::Passed { note: None });
    assert_eq!(report.phase, GradingPhase::Done);
    assert!(report.is_done());
    assert!(report.cache_patched);
    assert_eq!(report.next_level_slug(), Some("level-2"));
    assert_eq!(
        api.submissions(),
        [("level-1".to_string(), SubmissionPayload::passed())]
    );

    let result = report.submission.result().unwrap();
    assert_eq!(result.status, SubmissionStatus::Completed);
    assert_eq!(result.stars, 3);
    assert_eq!(result.xp_earned, 50);

    let level_1 = h.cache.get("level-1").unwrap();
    assert_eq!(level_1.status, ChallengeStatus::Completed);
    assert_eq!(level_1.stars, 3);
    assert_eq!(h.cache.get("level-2").unwrap().status, ChallengeStatus::Unlocked);
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test]
async fn missing_tests_pass_with_annotation() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "print(\"anything\")").await.unwrap();

    assert_eq!(
        report.grade,
        GradeOutcome::Passed {
            note: Some(NO_TESTS_NOTE)
        }
    );
    assert_eq!(report.grade.message(), "Passed (no tests defined)");
    assert_eq!(report.phase, GradingPhase::Done);
    assert_eq!(api.submit_calls(), 1);
    assert_eq!(h.provider.interpreter().run_count(), 1);
}

#[tokio::test]
async fn user_code_error_skips_verification() {
    let mut api = MockApi::new();
    api.expect_list_challenges()
        .returning(|| Ok(graded_ladder("assert True")));
    api.expect_submit().never();
    let h = harness(Arc::new(api)).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h
        .coordinator
        .run(&level, "print(\"start\")\nraise ZeroDivisionError(\"division by zero\")")
        .await
        .unwrap();

    match &report.grade {
        GradeOutcome::UserCodeError(exc) => {
            assert_eq!(exc.to_string(), "ZeroDivisionError: division by zero");
        }
        other => panic!("expected user error, got {other:?}"),
    }
    assert_eq!(report.output_lines, ["start"]);
    assert_eq!(report.phase, GradingPhase::Failed);
    assert_eq!(h.provider.interpreter().run_count(), 1);
}

#[tokio::test]
async fn verification_shares_the_user_invocation() {
    let api = Arc::new(FakeApi::new(graded_ladder("assert f() == 42")));
    let h = harness(api).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h
        .coordinator
        .run(&level, "print(\"once\")\ndef f(): return 42")
        .await
        .unwrap();

    assert_eq!(report.output_lines, ["once"]);
    let runs = h.provider.interpreter().runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(
        runs[0].stages,
        ["print(\"once\")\ndef f(): return 42", "assert f() == 42"]
    );
}

#[tokio::test]
async fn near_budget_solution_still_passes() {
    let api = Arc::new(FakeApi::new(graded_ladder("sleep(3)\nassert f() == 42")));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();
    assert_eq!(level.time_limit, None);

    let report = h
        .coordinator
        .run(&level, "sleep(4)\ndef f(): return 42")
        .await
        .unwrap();

    assert_eq!(report.grade, GradeOutcome::Passed { note: None });
    assert_eq!(report.phase, GradingPhase::Done);
    assert_eq!(api.submit_calls(), 1);
}

#[tokio::test]
async fn slow_user_code_times_out_before_verification() {
    let api = Arc::new(FakeApi::new(graded_ladder("assert True")));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "sleep(6)").await.unwrap();

    assert!(matches!(&report.grade, GradeOutcome::UserCodeError(exc) if exc.is_timeout()));
    assert_eq!(api.submit_calls(), 0);
}

#[tokio::test]
async fn timeout_fails_the_attempt() {
    let api = Arc::new(FakeApi::new(graded_ladder("assert True")));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "while True: pass").await.unwrap();

    assert!(matches!(&report.grade, GradeOutcome::UserCodeError(exc) if exc.is_timeout()));
    assert_eq!(report.phase, GradingPhase::Failed);
    assert_eq!(api.submit_calls(), 0);
}

#[tokio::test]
async fn transport_failure_leaves_cache_untouched() {
    let api = Arc::new(FakeApi::new(graded_ladder("assert f() == 42")));
    api.fail_submit(Some(ClientError::Network("connection refused".into())));
    let h = harness(api.clone()).await;
    let before = h.cache.snapshot();
    let level = h.cache.get("level-1").unwrap();

    let report = h
        .coordinator
        .run(&level, "def f(): return 42")
        .await
        .unwrap();

    assert!(report.grade.is_passed());
    assert_eq!(report.phase, GradingPhase::SubmitFailed);
    assert!(matches!(
        report.submission,
        SubmissionOutcome::Failed(ClientError::Network(_))
    ));
    assert_eq!(report.next_level_slug(), None);
    assert!(Arc::ptr_eq(&before, &h.cache.snapshot()));
    assert_eq!(h.cache.get("level-1").unwrap().status, ChallengeStatus::Unlocked);
}

#[tokio::test]
async fn server_rejection_is_submit_failed() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    api.force_verdict(SubmissionStatus::Failed);
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "pass").await.unwrap();

    assert_eq!(report.phase, GradingPhase::SubmitFailed);
    assert!(matches!(report.submission, SubmissionOutcome::Rejected(_)));
    assert!(!report.cache_patched);
    assert_eq!(h.cache.get("level-1").unwrap().status, ChallengeStatus::Unlocked);
}

#[tokio::test]
async fn resubmitting_a_completed_challenge_is_idempotent() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let first = h.coordinator.run(&level, "pass").await.unwrap();
    let after_first = h.cache.snapshot();
    let second = h.coordinator.run(&level, "pass").await.unwrap();

    assert_eq!(first.phase, GradingPhase::Done);
    assert_eq!(second.phase, GradingPhase::Done);
    assert_eq!(
        second.submission.result().unwrap().status,
        SubmissionStatus::AlreadyCompleted
    );
    assert!(!second.cache_patched);
    assert_eq!(*after_first, *h.cache.snapshot());
}

#[tokio::test]
async fn host_failure_is_env_error() {
    let mut api = MockApi::new();
    api.expect_list_challenges()
        .returning(|| Ok(graded_ladder("assert True")));
    api.expect_submit().never();
    let h = harness(Arc::new(api)).await;
    h.provider
        .interpreter()
        .fail_with(SandboxError::Instantiate("out of memory".into()));
    let level = h.cache.get("level-1").unwrap();

    let report = h.coordinator.run(&level, "print(1)").await.unwrap();

    assert!(matches!(report.grade, GradeOutcome::EnvError(_)));
    assert_eq!(report.phase, GradingPhase::EnvError);
    assert!(report.output_lines.is_empty());
}

#[tokio::test]
async fn run_requires_a_ready_runtime() {
    let api: Arc<dyn ChallengeApi> = Arc::new(FakeApi::new(ladder(1)));
    let runtime = RuntimeManager::new(Arc::new(ScriptedProvider::new()));
    let cache = ProgressionCache::new(api.clone());
    let coordinator = GradingCoordinator::new(runtime, Sandbox::default(), api, cache);

    let err = coordinator
        .run(&challenge("level-1", 1, ChallengeStatus::Unlocked), "pass")
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::RuntimeNotReady));

    coordinator.prepare().await.unwrap();
    let report = coordinator
        .run(&challenge("level-1", 1, ChallengeStatus::Unlocked), "pass")
        .await
        .unwrap();
    assert!(report.grade.is_passed());
}

#[tokio::test(start_paused = true)]
async fn second_run_is_rejected_while_first_is_running() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api.clone()).await;
    h.provider.interpreter().set_delay(Duration::from_secs(1));
    let level = h.cache.get("level-1").unwrap();

    let first = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let level = level.clone();
        async move { coordinator.run(&level, "pass").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.coordinator.phase(), GradingPhase::RunningUserCode);

    let err = h.coordinator.run(&level, "pass").await.unwrap_err();
    assert!(matches!(err, GradingError::RunInProgress { .. }));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.phase, GradingPhase::Done);
    assert!(h.coordinator.active_run().is_none());
}

#[tokio::test(start_paused = true)]
async fn abandoned_run_discards_output_and_skips_submission() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api.clone()).await;
    h.provider.interpreter().set_delay(Duration::from_secs(1));
    let level = h.cache.get("level-1").unwrap();

    let stale = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let level = level.clone();
        async move { coordinator.run(&level, "print(\"stale\")").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let abandoned = h.coordinator.abandon();
    assert!(abandoned.is_some());
    assert_eq!(h.coordinator.phase(), GradingPhase::Idle);

    let err = stale.await.unwrap().unwrap_err();
    assert!(matches!(err, GradingError::Superseded { run_id } if Some(run_id) == abandoned));
    assert_eq!(api.submit_calls(), 0);
    assert_eq!(h.coordinator.phase(), GradingPhase::Idle);

    h.provider.interpreter().set_delay(Duration::ZERO);
    let report = h.coordinator.run(&level, "print(\"fresh\")").await.unwrap();
    assert_eq!(report.output_lines, ["fresh"]);
    assert_eq!(report.phase, GradingPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn abandon_during_submission_keeps_acknowledged_result() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    api.set_submit_delay(Duration::from_secs(1));
    let h = harness(api.clone()).await;
    let level = h.cache.get("level-1").unwrap();

    let pending = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let level = level.clone();
        async move { coordinator.run(&level, "pass").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.coordinator.phase(), GradingPhase::Submitting);

    let abandoned = h.coordinator.abandon();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, GradingError::Superseded { run_id } if Some(run_id) == abandoned));
    assert_eq!(api.submit_calls(), 1);
    assert_eq!(h.cache.get("level-1").unwrap().status, ChallengeStatus::Completed);
    assert_eq!(h.cache.get("level-2").unwrap().status, ChallengeStatus::Unlocked);
    assert_eq!(h.coordinator.phase(), GradingPhase::Idle);
}

#[tokio::test]
async fn abandon_without_a_run_is_a_no_op() {
    let h = harness(Arc::new(FakeApi::new(ladder(1)))).await;
    assert_eq!(h.coordinator.abandon(), None);
    assert_eq!(h.coordinator.phase(), GradingPhase::Idle);
}

#[tokio::test]
async fn phase_changes_are_observable() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api).await;
    let mut phases = h.coordinator.subscribe();
    let level = h.cache.get("level-1").unwrap();

    h.coordinator.run(&level, "pass").await.unwrap();

    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), GradingPhase::Done);
}

#[tokio::test]
async fn hint_purchase_is_recorded() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    let h = harness(api.clone()).await;

    let hint = h.coordinator.purchase_hint("level-1").await.unwrap();

    assert_eq!(hint.hints_purchased, Some(1));
    assert_eq!(hint.coins_remaining, Some(90));
    assert_eq!(h.cache.get("level-1").unwrap().hints_purchased, 1);
}

#[tokio::test]
async fn hint_refused_for_lack_of_funds() {
    let api = Arc::new(FakeApi::new(ladder(2)));
    api.set_balance(5, 10);
    let h = harness(api.clone()).await;

    let err = h.coordinator.purchase_hint("level-1").await.unwrap_err();

    assert!(err.is_insufficient_funds());
    assert_eq!(api.balance(), 5);
    assert_eq!(h.cache.get("level-1").unwrap().hints_purchased, 0);
}
