//! Progression cache
//!
//! Holds the ordered challenge list for the session. Reads are served from
//! the cache while it is younger than the freshness window; otherwise a
//! single fetch goes to the server and every concurrent caller shares it.
//!
//! Snapshots are `Arc<Vec<Challenge>>`. Mutations are copy-on-write, so a
//! snapshot handed out earlier never changes under its holder.

use crate::error::{ProgressError, Result};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use ladder_client::{ChallengeApi, ClientError};
use ladder_model::{Challenge, ChallengeStatus, SubmissionResult, MAX_STARS};
use moka::future::Cache;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default freshness window for the challenge list
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(300);

type Snapshot = Arc<Vec<Challenge>>;
type FetchFuture = Shared<BoxFuture<'static, std::result::Result<Snapshot, ClientError>>>;

/// Cache tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Age after which the list is refetched
    pub freshness: Duration,
    /// Maximum number of cached challenge details
    pub detail_capacity: u64,
}

impl CacheOptions {
    /// With freshness window
    #[inline]
    #[must_use]
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// With detail cache capacity
    #[inline]
    #[must_use]
    pub fn with_detail_capacity(mut self, capacity: u64) -> Self {
        self.detail_capacity = capacity;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            detail_capacity: 256,
        }
    }
}

#[derive(Default)]
struct Envelope {
    challenges: Snapshot,
    last_fetched: Option<Instant>,
    last_fetched_at: Option<DateTime<Utc>>,
}

struct InFlight {
    id: u64,
    future: FetchFuture,
}

struct Inner {
    api: Arc<dyn ChallengeApi>,
    options: CacheOptions,
    state: RwLock<Envelope>,
    in_flight: Mutex<Option<InFlight>>,
    details: Cache<String, Challenge>,
    /// Bumped by `clear`; fetches started under an older epoch are discarded
    epoch: AtomicU64,
    next_fetch_id: AtomicU64,
    fetches: AtomicU64,
    revision: watch::Sender<u64>,
}

impl Inner {
    async fn fetch(
        inner: Arc<Self>,
        id: u64,
        epoch: u64,
    ) -> std::result::Result<Snapshot, ClientError> {
        inner.fetches.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = inner.api.list_challenges().await;

        let outcome = match result {
            Ok(mut challenges) => {
                challenges.sort_by_key(|c| c.order);
                let snapshot = Arc::new(challenges);
                if inner.epoch.load(Ordering::SeqCst) == epoch {
                    {
                        let mut state = inner.state.write();
                        state.challenges = Arc::clone(&snapshot);
                        state.last_fetched = Some(Instant::now());
                        state.last_fetched_at = Some(Utc::now());
                    }
                    inner.bump();
                    info!(
                        count = snapshot.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "challenge list refreshed"
                    );
                } else {
                    debug!("cache cleared during fetch; result discarded");
                }
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "challenge list fetch failed; cache left untouched");
                Err(e)
            }
        };

        let mut slot = inner.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }
        outcome
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn fresh_snapshot(&self, max_age: Duration) -> Option<Snapshot> {
        let state = self.state.read();
        let fetched = state.last_fetched?;
        if state.challenges.is_empty() || fetched.elapsed() >= max_age {
            return None;
        }
        Some(Arc::clone(&state.challenges))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Challenge>) -> (T, bool)) -> T {
        let (value, changed) = {
            let mut state = self.state.write();
            f(Arc::make_mut(&mut state.challenges))
        };
        if changed {
            self.bump();
        }
        value
    }
}

/// Session cache of the learner's challenge list
///
/// Cheap to clone; clones share the same cache.
///
/// # Example
///
/// ```rust,no_run
/// use ladder_client::{ApiConfig, HttpChallengeApi};
/// use ladder_progress::ProgressionCache;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let api = Arc::new(HttpChallengeApi::new(ApiConfig::default())?);
/// let cache = ProgressionCache::new(api);
/// let challenges = cache.fetch_all(false).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProgressionCache {
    inner: Arc<Inner>,
}

impl ProgressionCache {
    /// Create an empty cache with default options
    #[must_use]
    pub fn new(api: Arc<dyn ChallengeApi>) -> Self {
        Self::with_options(api, CacheOptions::default())
    }

    /// Create an empty cache
    #[must_use]
    pub fn with_options(api: Arc<dyn ChallengeApi>, options: CacheOptions) -> Self {
        let (revision, _) = watch::channel(0);
        let details = Cache::builder()
            .max_capacity(options.detail_capacity)
            .time_to_live(options.freshness)
            .build();
        Self {
            inner: Arc::new(Inner {
                api,
                options,
                state: RwLock::new(Envelope::default()),
                in_flight: Mutex::new(None),
                details,
                epoch: AtomicU64::new(0),
                next_fetch_id: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                revision,
            }),
        }
    }

    /// Options in use
    #[inline]
    #[must_use]
    pub fn options(&self) -> CacheOptions {
        self.inner.options
    }

    /// Return the challenge list, fetching it when stale or when `force` is set
    ///
    /// A fetch already in flight is always shared, forced or not.
    ///
    /// # Errors
    /// `ProgressError::Client` when the fetch fails. The cached list and
    /// `last_fetched` are left as they were.
    pub async fn fetch_all(&self, force: bool) -> Result<Arc<Vec<Challenge>>> {
        let max_age = if force { None } else { Some(self.inner.options.freshness) };
        self.load(max_age).await
    }

    /// Like [`fetch_all`](Self::fetch_all) with a caller-supplied freshness threshold
    ///
    /// # Errors
    /// See [`fetch_all`](Self::fetch_all).
    pub async fn ensure_fresh(&self, max_age: Duration) -> Result<Arc<Vec<Challenge>>> {
        self.load(Some(max_age)).await
    }

    async fn load(&self, max_age: Option<Duration>) -> Result<Arc<Vec<Challenge>>> {
        let future = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(pending) => pending.future.clone(),
                None => {
                    if let Some(snapshot) = max_age.and_then(|age| self.inner.fresh_snapshot(age)) {
                        return Ok(snapshot);
                    }
                    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::SeqCst);
                    let epoch = self.inner.epoch.load(Ordering::SeqCst);
                    let future = Inner::fetch(Arc::clone(&self.inner), id, epoch)
                        .boxed()
                        .shared();
                    *slot = Some(InFlight {
                        id,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        Ok(future.await?)
    }

    /// Current list without fetching
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Challenge>> {
        Arc::clone(&self.inner.state.read().challenges)
    }

    /// Cached record for `slug`
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<Challenge> {
        self.inner
            .state
            .read()
            .challenges
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
    }

    /// Whether the cache holds no challenges
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().challenges.is_empty()
    }

    /// Apply an acknowledged submission locally
    ///
    /// Marks `slug` completed, keeps the better star rating and unlocks
    /// `next_level_slug` when it is locked and nothing before it is. Applying
    /// the same result twice is the same as applying it once. Results the
    /// server did not acknowledge are ignored.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    /// `ProgressError::UnknownChallenge` when `slug` is not cached.
    pub fn apply_submission_result(&self, slug: &str, result: &SubmissionResult) -> Result<bool> {
        if !result.status.is_acknowledged() {
            debug!(slug, status = ?result.status, "unacknowledged result not applied");
            return Ok(false);
        }

        let changed = self.inner.mutate(|challenges| {
            let Some(challenge) = challenges.iter_mut().find(|c| c.slug == slug) else {
                return (
                    Err(ProgressError::UnknownChallenge {
                        slug: slug.to_string(),
                    }),
                    false,
                );
            };

            let mut changed = false;
            let status = challenge.status.advance(ChallengeStatus::Completed);
            if status != challenge.status {
                challenge.status = status;
                changed = true;
            }
            let stars = challenge.stars.max(result.stars.min(MAX_STARS));
            if stars != challenge.stars {
                challenge.stars = stars;
                changed = true;
            }

            if let Some(next) = result.next_level_slug.as_deref() {
                changed |= unlock_in_sequence(challenges, next);
            }
            (Ok(changed), changed)
        })?;

        if changed {
            info!(slug, stars = result.stars, next = ?result.next_level_slug, "applied submission result");
        }
        Ok(changed)
    }

    /// Merge one record into the list, keeping it sorted by `order`
    ///
    /// Progress fields never regress: status and stars keep the better of
    /// the cached and incoming values. Everything else comes from `challenge`.
    pub fn upsert_challenge(&self, challenge: Challenge) {
        let slug = challenge.slug.clone();
        self.inner.mutate(move |challenges| {
            let mut incoming = challenge;
            if let Some(index) = challenges.iter().position(|c| c.slug == incoming.slug) {
                let existing = challenges.remove(index);
                incoming.status = existing.status.advance(incoming.status);
                incoming.stars = existing.stars.max(incoming.stars);
                incoming.hints_purchased = existing.hints_purchased.max(incoming.hints_purchased);
            }
            let at = challenges.partition_point(|c| c.order <= incoming.order);
            challenges.insert(at, incoming);
            ((), true)
        });
        debug!(slug = %slug, "challenge upserted");
    }

    /// Fetch one challenge through the detail cache
    ///
    /// Details live for the freshness window; concurrent requests for the
    /// same slug share one round trip. A fetched detail is merged into the
    /// list. Returns the list's record, which may carry newer local progress
    /// than the server copy.
    ///
    /// # Errors
    /// `ProgressError::Client` when the detail fetch fails.
    pub async fn fetch_detail(&self, slug: &str, force: bool) -> Result<Challenge> {
        if force {
            self.inner.details.invalidate(slug).await;
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let key = slug.to_string();
        let cache = self.clone();
        let detail = self
            .inner
            .details
            .try_get_with(key.clone(), async move {
                let challenge = cache.inner.api.get_challenge(&key).await?;
                if cache.inner.epoch.load(Ordering::SeqCst) == epoch {
                    cache.upsert_challenge(challenge.clone());
                }
                Ok::<_, ClientError>(challenge)
            })
            .await
            .map_err(|e: Arc<ClientError>| ProgressError::Client((*e).clone()))?;

        Ok(self.get(slug).unwrap_or(detail))
    }

    /// Record a successful hint purchase
    ///
    /// Uses the server's count when provided, otherwise adds one. Never
    /// lowers the count. Returns the new count.
    ///
    /// # Errors
    /// `ProgressError::UnknownChallenge` when `slug` is not cached.
    pub fn record_hint_purchase(&self, slug: &str, server_count: Option<u32>) -> Result<u32> {
        self.inner.mutate(|challenges| {
            let Some(challenge) = challenges.iter_mut().find(|c| c.slug == slug) else {
                return (
                    Err(ProgressError::UnknownChallenge {
                        slug: slug.to_string(),
                    }),
                    false,
                );
            };
            let count = server_count
                .unwrap_or(challenge.hints_purchased.saturating_add(1))
                .max(challenge.hints_purchased);
            let changed = count != challenge.hints_purchased;
            challenge.hints_purchased = count;
            (Ok(count), changed)
        })
    }

    /// Drop everything cached for the session
    ///
    /// A fetch in flight keeps running for its current waiters but its
    /// result is not stored.
    pub fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.in_flight.lock().take();
        *self.inner.state.write() = Envelope::default();
        self.inner.details.invalidate_all();
        self.inner.bump();
        info!("progression cache cleared");
    }

    /// Observe mutations; the value is a revision counter
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Current revision
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Wall-clock time of the last successful fetch
    #[must_use]
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().last_fetched_at
    }

    /// Time since the last successful fetch
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.inner.state.read().last_fetched.map(|t| t.elapsed())
    }

    /// Whether a list fetch is in flight
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Number of list fetches issued so far
    #[inline]
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ProgressionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ProgressionCache")
            .field("challenges", &state.challenges.len())
            .field("last_fetched_at", &state.last_fetched_at)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Unlock `slug` if it is locked and no earlier exercise is still locked
fn unlock_in_sequence(challenges: &mut [Challenge], slug: &str) -> bool {
    let Some(index) = challenges.iter().position(|c| c.slug == slug) else {
        debug!(slug, "next level not cached; unlock deferred to refetch");
        return false;
    };
    if challenges[index].status != ChallengeStatus::Locked {
        return false;
    }

    let order = challenges[index].order;
    let blocked = challenges
        .iter()
        .any(|c| c.is_exercise() && c.order < order && c.status == ChallengeStatus::Locked);
    if blocked {
        warn!(slug, "earlier challenge still locked; unlock skipped");
        return false;
    }

    challenges[index].status = ChallengeStatus::Unlocked;
    true
}
