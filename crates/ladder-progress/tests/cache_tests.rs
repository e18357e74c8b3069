use ladder_client::ClientError;
use ladder_model::{Challenge, ChallengeStatus, SubmissionResult, SubmissionStatus};
use ladder_progress::{derive_view, ProgressError, ProgressionCache};
use ladder_test_utils::{challenge, ladder, FakeApi};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn cache_over(challenges: Vec<Challenge>) -> (ProgressionCache, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::new(challenges));
    (ProgressionCache::new(api.clone()), api)
}

#[tokio::test(start_paused = true)]
async fn fetch_within_freshness_window_hits_network_once() {
    let (cache, api) = cache_over(ladder(3));

    let first = cache.fetch_all(false).await.unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    let second = cache.fetch_all(false).await.unwrap();

    assert_eq!(api.list_calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.last_fetched().is_some());
}

#[tokio::test(start_paused = true)]
async fn stale_cache_refetches() {
    let (cache, api) = cache_over(ladder(2));

    cache.fetch_all(false).await.unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;
    cache.fetch_all(false).await.unwrap();

    assert_eq!(api.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn ensure_fresh_uses_caller_threshold() {
    let (cache, api) = cache_over(ladder(2));

    cache.fetch_all(false).await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    cache.ensure_fresh(Duration::from_secs(30)).await.unwrap();
    assert_eq!(api.list_calls(), 1);

    cache.ensure_fresh(Duration::from_secs(5)).await.unwrap();
    assert_eq!(api.list_calls(), 2);
}

#[tokio::test]
async fn force_bypasses_freshness() {
    let (cache, api) = cache_over(ladder(2));

    cache.fetch_all(false).await.unwrap();
    cache.fetch_all(true).await.unwrap();

    assert_eq!(api.list_calls(), 2);
}

#[tokio::test]
async fn empty_cache_is_never_fresh() {
    let (cache, api) = cache_over(Vec::new());

    cache.fetch_all(false).await.unwrap();
    cache.fetch_all(false).await.unwrap();

    assert_eq!(api.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_round_trip() {
    let (cache, api) = cache_over(ladder(3));
    api.set_list_delay(Duration::from_millis(200));

    let (a, b, c) = tokio::join!(
        cache.fetch_all(false),
        cache.fetch_all(true),
        cache.ensure_fresh(Duration::ZERO),
    );

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(api.list_calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
    assert!(!cache.is_fetching());
}

#[tokio::test]
async fn failed_fetch_leaves_cache_untouched() {
    let (cache, api) = cache_over(ladder(2));
    let before = cache.fetch_all(false).await.unwrap();
    let fetched_at = cache.last_fetched();

    api.fail_list(Some(ClientError::Network("connection reset".into())));
    let err = cache.fetch_all(true).await.unwrap_err();

    assert!(matches!(err, ProgressError::Client(ClientError::Network(_))));
    assert!(err.is_retryable());
    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
    assert_eq!(cache.last_fetched(), fetched_at);

    api.fail_list(None);
    assert!(cache.fetch_all(true).await.is_ok());
    assert_eq!(api.list_calls(), 3);
}

#[tokio::test]
async fn fetched_list_is_sorted_by_order() {
    let (cache, _api) = cache_over(vec![
        challenge("c", 3, ChallengeStatus::Locked),
        challenge("a", 1, ChallengeStatus::Unlocked),
        challenge("b", 2, ChallengeStatus::Locked),
    ]);

    let list = cache.fetch_all(false).await.unwrap();
    let slugs: Vec<_> = list.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, ["a", "b", "c"]);
}

#[tokio::test]
async fn submission_result_is_visible_before_refetch() {
    let (cache, api) = cache_over(ladder(3));
    cache.fetch_all(false).await.unwrap();
    let mut revisions = cache.subscribe();

    let result = SubmissionResult::completed(3, 50).with_next_level("level-2");
    assert!(cache.apply_submission_result("level-1", &result).unwrap());

    let level_1 = cache.get("level-1").unwrap();
    assert_eq!(level_1.status, ChallengeStatus::Completed);
    assert_eq!(level_1.stars, 3);
    assert_eq!(cache.get("level-2").unwrap().status, ChallengeStatus::Unlocked);
    assert_eq!(cache.get("level-3").unwrap().status, ChallengeStatus::Locked);
    assert!(revisions.has_changed().unwrap());
    assert_eq!(api.list_calls(), 1);

    assert!(!cache.apply_submission_result("level-1", &result).unwrap());
}

#[tokio::test]
async fn optimistic_unlock_respects_sequence() {
    let (cache, _api) = cache_over(ladder(3));
    cache.fetch_all(false).await.unwrap();

    let skipping = SubmissionResult::completed(1, 10).with_next_level("level-3");
    cache.apply_submission_result("level-1", &skipping).unwrap();

    assert_eq!(cache.get("level-3").unwrap().status, ChallengeStatus::Locked);
}

#[tokio::test]
async fn rejected_result_is_not_applied() {
    let (cache, _api) = cache_over(ladder(2));
    cache.fetch_all(false).await.unwrap();

    let rejected = SubmissionResult {
        status: SubmissionStatus::Failed,
        stars: 3,
        xp_earned: 0,
        next_level_slug: Some("level-2".into()),
    };
    assert!(!cache.apply_submission_result("level-1", &rejected).unwrap());
    assert_eq!(cache.get("level-1").unwrap().status, ChallengeStatus::Unlocked);
}

#[tokio::test]
async fn unknown_slug_is_reported() {
    let (cache, _api) = cache_over(ladder(1));
    cache.fetch_all(false).await.unwrap();

    let err = cache
        .apply_submission_result("ghost", &SubmissionResult::completed(1, 0))
        .unwrap_err();
    assert_eq!(
        err,
        ProgressError::UnknownChallenge {
            slug: "ghost".into()
        }
    );
}

#[tokio::test]
async fn snapshots_are_copy_on_write() {
    let (cache, _api) = cache_over(ladder(2));
    let before = cache.fetch_all(false).await.unwrap();

    cache
        .apply_submission_result("level-1", &SubmissionResult::completed(2, 50))
        .unwrap();

    assert_eq!(before[0].status, ChallengeStatus::Unlocked);
    assert_eq!(cache.snapshot()[0].status, ChallengeStatus::Completed);
}

#[tokio::test]
async fn refetch_overrides_optimistic_patch() {
    let (cache, _api) = cache_over(ladder(2));
    cache.fetch_all(false).await.unwrap();
    cache
        .apply_submission_result("level-1", &SubmissionResult::completed(3, 50))
        .unwrap();

    let list = cache.fetch_all(true).await.unwrap();
    assert_eq!(list[0].status, ChallengeStatus::Unlocked);
}

#[tokio::test]
async fn upsert_merges_and_inserts_in_order() {
    let (cache, _api) = cache_over(vec![
        challenge("a", 1, ChallengeStatus::Completed).with_stars(2),
        challenge("c", 3, ChallengeStatus::Locked),
    ]);
    cache.fetch_all(false).await.unwrap();

    cache.upsert_challenge(challenge("b", 2, ChallengeStatus::Unlocked));
    let mut stale = challenge("a", 1, ChallengeStatus::Unlocked).with_stars(1);
    stale.title = "Renamed".into();
    cache.upsert_challenge(stale);

    let list = cache.snapshot();
    let slugs: Vec<_> = list.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, ["a", "b", "c"]);
    assert_eq!(list[0].status, ChallengeStatus::Completed);
    assert_eq!(list[0].stars, 2);
    assert_eq!(list[0].title, "Renamed");
}

#[tokio::test]
async fn detail_fetches_are_cached_and_merged() {
    let (cache, api) = cache_over(ladder(2));
    cache.fetch_all(false).await.unwrap();
    cache
        .apply_submission_result("level-1", &SubmissionResult::completed(3, 50))
        .unwrap();

    let detail = cache.fetch_detail("level-1", false).await.unwrap();
    assert_eq!(detail.status, ChallengeStatus::Completed);
    cache.fetch_detail("level-1", false).await.unwrap();
    assert_eq!(api.detail_calls(), 1);

    cache.fetch_detail("level-1", true).await.unwrap();
    assert_eq!(api.detail_calls(), 2);

    let err = cache.fetch_detail("ghost", false).await.unwrap_err();
    assert!(matches!(err, ProgressError::Client(ClientError::NotFound(_))));
}

#[tokio::test]
async fn hint_purchases_never_lower_the_count() {
    let (cache, _api) = cache_over(ladder(1));
    cache.fetch_all(false).await.unwrap();

    assert_eq!(cache.record_hint_purchase("level-1", None).unwrap(), 1);
    assert_eq!(cache.record_hint_purchase("level-1", Some(4)).unwrap(), 4);
    assert_eq!(cache.record_hint_purchase("level-1", Some(2)).unwrap(), 4);
    assert!(cache.record_hint_purchase("ghost", None).is_err());
}

#[tokio::test(start_paused = true)]
async fn clear_during_fetch_keeps_cache_empty() {
    let (cache, api) = cache_over(ladder(2));
    api.set_list_delay(Duration::from_millis(100));

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.fetch_all(false).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.is_fetching());

    cache.clear();
    let result = pending.await.unwrap().unwrap();

    assert_eq!(result.len(), 2);
    assert!(cache.is_empty());
    assert!(cache.last_fetched().is_none());

    api.set_list_delay(Duration::ZERO);
    cache.fetch_all(false).await.unwrap();
    assert_eq!(cache.snapshot().len(), 2);
    assert_eq!(api.list_calls(), 2);
}

#[tokio::test]
async fn derived_view_follows_cache() {
    let (cache, _api) = cache_over(ladder(1));
    cache.fetch_all(false).await.unwrap();
    assert_eq!(
        derive_view(&cache.snapshot()).last().unwrap().status,
        ChallengeStatus::Locked
    );

    cache
        .apply_submission_result("level-1", &SubmissionResult::completed(3, 50))
        .unwrap();
    assert_eq!(
        derive_view(&cache.snapshot()).last().unwrap().status,
        ChallengeStatus::Unlocked
    );
}

fn arb_status() -> impl Strategy<Value = ChallengeStatus> {
    prop_oneof![
        Just(ChallengeStatus::Locked),
        Just(ChallengeStatus::Unlocked),
        Just(ChallengeStatus::Completed),
    ]
}

fn arb_result(n: usize) -> impl Strategy<Value = SubmissionResult> {
    (0u8..=5, prop::option::of(1..=n)).prop_map(|(stars, next)| {
        let result = SubmissionResult::completed(stars, 10);
        match next {
            Some(i) => result.with_next_level(format!("level-{i}")),
            None => result,
        }
    })
}

fn seeded_cache(statuses: &[(ChallengeStatus, u8)]) -> ProgressionCache {
    let challenges = statuses
        .iter()
        .enumerate()
        .map(|(i, (status, stars))| {
            challenge(&format!("level-{}", i + 1), i as i64 + 1, *status).with_stars(*stars)
        })
        .collect::<Vec<_>>();
    let cache = ProgressionCache::new(Arc::new(FakeApi::new(Vec::new())));
    for c in challenges {
        cache.upsert_challenge(c);
    }
    cache
}

proptest! {
    #[test]
    fn prop_apply_never_regresses(
        statuses in prop::collection::vec((arb_status(), 0u8..=3), 1..6),
        target in 0usize..6,
        result in arb_result(6),
    ) {
        let cache = seeded_cache(&statuses);
        let slug = format!("level-{}", target % statuses.len() + 1);
        let before = cache.snapshot();

        cache.apply_submission_result(&slug, &result).unwrap();
        let after = cache.snapshot();

        for (b, a) in before.iter().zip(after.iter()) {
            prop_assert!(a.status >= b.status);
            prop_assert!(a.stars >= b.stars);
        }
        let patched = after.iter().find(|c| c.slug == slug).unwrap();
        prop_assert_eq!(patched.status, ChallengeStatus::Completed);
    }

    #[test]
    fn prop_apply_is_idempotent(
        statuses in prop::collection::vec((arb_status(), 0u8..=3), 1..6),
        result in arb_result(6),
    ) {
        let cache = seeded_cache(&statuses);
        cache.apply_submission_result("level-1", &result).unwrap();
        let once = cache.snapshot();

        let changed = cache.apply_submission_result("level-1", &result).unwrap();
        let twice = cache.snapshot();
        prop_assert!(!changed);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_upsert_keeps_sorted(orders in prop::collection::vec(-20i64..20, 0..20)) {
        let cache = ProgressionCache::new(Arc::new(FakeApi::new(Vec::new())));
        for (i, order) in orders.iter().enumerate() {
            let slug = format!("c-{}", i % 7);
            cache.upsert_challenge(challenge(&slug, *order, ChallengeStatus::Locked));
        }

        let list = cache.snapshot();
        prop_assert!(list.windows(2).all(|w| w[0].order <= w[1].order));
        let mut slugs: Vec<_> = list.iter().map(|c| c.slug.clone()).collect();
        slugs.sort();
        slugs.dedup();
        prop_assert_eq!(slugs.len(), list.len());
    }
}
