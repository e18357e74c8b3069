//! In-memory progression server

use async_trait::async_trait;
use ladder_client::{ChallengeApi, ClientError, Result};
use ladder_model::{
    CertificateEligibility, CertificateRecord, Challenge, ChallengeStatus, HintResult,
    SubmissionPayload, SubmissionResult, SubmissionStatus, MAX_STARS,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct ServerState {
    challenges: Vec<Challenge>,
    balance: u64,
    hint_price: u64,
    certificate: Option<CertificateRecord>,
}

/// [`ChallengeApi`] backed by an in-memory ladder
///
/// Submissions behave like the real server: the first passing submission
/// completes the challenge with three stars and unlocks the next one.
pub struct FakeApi {
    state: Mutex<ServerState>,
    list_failure: Mutex<Option<ClientError>>,
    submit_failure: Mutex<Option<ClientError>>,
    submit_verdict: Mutex<Option<SubmissionStatus>>,
    list_delay: Mutex<Duration>,
    submit_delay: Mutex<Duration>,
    submissions: Mutex<Vec<(String, SubmissionPayload)>>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    hint_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self {
            state: Mutex::new(ServerState {
                challenges,
                balance: 100,
                hint_price: 10,
                certificate: None,
            }),
            list_failure: Mutex::new(None),
            submit_failure: Mutex::new(None),
            submit_verdict: Mutex::new(None),
            list_delay: Mutex::new(Duration::ZERO),
            submit_delay: Mutex::new(Duration::ZERO),
            submissions: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            hint_calls: AtomicUsize::new(0),
        }
    }

    /// Server-side copy of the ladder
    pub fn challenges(&self) -> Vec<Challenge> {
        self.state.lock().challenges.clone()
    }

    pub fn set_challenges(&self, challenges: Vec<Challenge>) {
        self.state.lock().challenges = challenges;
    }

    pub fn set_balance(&self, balance: u64, hint_price: u64) {
        let mut state = self.state.lock();
        state.balance = balance;
        state.hint_price = hint_price;
    }

    pub fn balance(&self) -> u64 {
        self.state.lock().balance
    }

    pub fn issue_certificate(&self, record: CertificateRecord) {
        self.state.lock().certificate = Some(record);
    }

    /// Fail list requests with `error` until cleared with `None`
    pub fn fail_list(&self, error: Option<ClientError>) {
        *self.list_failure.lock() = error;
    }

    /// Fail submissions with `error` until cleared with `None`
    pub fn fail_submit(&self, error: Option<ClientError>) {
        *self.submit_failure.lock() = error;
    }

    /// Answer every submission with `verdict` instead of emulating the server
    pub fn force_verdict(&self, verdict: SubmissionStatus) {
        *self.submit_verdict.lock() = Some(verdict);
    }

    /// Delay list responses, e.g. to hold a fetch in flight
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = delay;
    }

    /// Delay submissions after the server has recorded them
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = delay;
    }

    pub fn submissions(&self) -> Vec<(String, SubmissionPayload)> {
        self.submissions.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn hint_calls(&self) -> usize {
        self.hint_calls.load(Ordering::SeqCst)
    }

    fn judge(&self, slug: &str, payload: &SubmissionPayload) -> Result<SubmissionResult> {
        if let Some(error) = self.submit_failure.lock().clone() {
            return Err(error);
        }
        if let Some(status) = *self.submit_verdict.lock() {
            return Ok(SubmissionResult {
                status,
                stars: 0,
                xp_earned: 0,
                next_level_slug: None,
            });
        }

        let mut state = self.state.lock();
        state.challenges.sort_by_key(|c| c.order);
        let index = state
            .challenges
            .iter()
            .position(|c| c.slug == slug)
            .ok_or_else(|| ClientError::NotFound(format!("/challenges/{slug}/submit")))?;

        if !payload.passed {
            return Ok(SubmissionResult {
                status: SubmissionStatus::Failed,
                stars: 0,
                xp_earned: 0,
                next_level_slug: None,
            });
        }

        let challenge = &mut state.challenges[index];
        let first_time = challenge.status != ChallengeStatus::Completed;
        challenge.status = ChallengeStatus::Completed;
        challenge.stars = MAX_STARS;
        let xp_earned = if first_time { challenge.xp_reward } else { 0 };

        let next_level_slug = state.challenges[index + 1..]
            .iter_mut()
            .find(|c| c.is_exercise())
            .map(|next| {
                next.status = next.status.advance(ChallengeStatus::Unlocked);
                next.slug.clone()
            });

        Ok(SubmissionResult {
            status: if first_time {
                SubmissionStatus::Completed
            } else {
                SubmissionStatus::AlreadyCompleted
            },
            stars: MAX_STARS,
            xp_earned,
            next_level_slug,
        })
    }
}

#[async_trait]
impl ChallengeApi for FakeApi {
    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.list_failure.lock().clone() {
            return Err(error);
        }
        let mut challenges = self.challenges();
        challenges.sort_by_key(|c| c.order);
        Ok(challenges)
    }

    async fn get_challenge(&self, slug: &str) -> Result<Challenge> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .challenges
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("/challenges/{slug}")))
    }

    async fn submit(&self, slug: &str, payload: &SubmissionPayload) -> Result<SubmissionResult> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().push((slug.to_string(), *payload));
        let result = self.judge(slug, payload);
        let delay = *self.submit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn purchase_hint(&self, slug: &str) -> Result<HintResult> {
        self.hint_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let index = state
            .challenges
            .iter()
            .position(|c| c.slug == slug)
            .ok_or_else(|| ClientError::NotFound(format!("/challenges/{slug}")))?;
        if state.balance < state.hint_price {
            return Err(ClientError::InsufficientFunds {
                message: "Not enough coins".to_string(),
            });
        }
        state.balance -= state.hint_price;
        let coins_remaining = state.balance;

        let challenge = &mut state.challenges[index];
        challenge.hints_purchased += 1;

        Ok(HintResult {
            hint: format!("Hint {} for {slug}", challenge.hints_purchased),
            coins_remaining: Some(coins_remaining),
            hints_purchased: Some(challenge.hints_purchased),
        })
    }

    async fn certificate_eligibility(&self) -> Result<CertificateEligibility> {
        let state = self.state.lock();
        let mut exercises = state.challenges.iter().filter(|c| c.is_exercise()).peekable();
        let eligible = exercises.peek().is_some()
            && exercises.all(|c| c.status == ChallengeStatus::Completed);
        Ok(CertificateEligibility {
            eligible,
            has_certificate: state.certificate.is_some(),
        })
    }

    async fn my_certificate(&self) -> Result<Option<CertificateRecord>> {
        Ok(self.state.lock().certificate.clone())
    }
}
