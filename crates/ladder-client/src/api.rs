//! Challenge API contract

use crate::error::Result;
use ladder_model::{
    CertificateEligibility, CertificateRecord, Challenge, HintResult, SubmissionPayload,
    SubmissionResult,
};

/// Endpoints consumed by the grading pipeline and the progression cache
///
/// Calls are thin and retry-free; callers decide what a failure means.
#[async_trait::async_trait]
pub trait ChallengeApi: Send + Sync {
    /// `GET /challenges`
    async fn list_challenges(&self) -> Result<Vec<Challenge>>;

    /// `GET /challenges/{slug}`
    async fn get_challenge(&self, slug: &str) -> Result<Challenge>;

    /// `POST /challenges/{slug}/submit`
    async fn submit(&self, slug: &str, payload: &SubmissionPayload) -> Result<SubmissionResult>;

    /// `POST /challenges/{slug}/purchase_ai_assist`
    ///
    /// Fails with `ClientError::InsufficientFunds` when the server refuses
    /// for lack of currency.
    async fn purchase_hint(&self, slug: &str) -> Result<HintResult>;

    /// `GET /certificates/check_eligibility`
    async fn certificate_eligibility(&self) -> Result<CertificateEligibility>;

    /// `GET /certificates/my_certificate`; `None` when no certificate exists
    async fn my_certificate(&self) -> Result<Option<CertificateRecord>>;
}

/// Advisory affordability check for hint buttons
///
/// Only drives presentation. The purchase itself always goes to the server,
/// which is the sole judge of the balance.
#[inline]
#[must_use]
pub fn hint_affordable(balance: u64, price: u64) -> bool {
    balance >= price
}
