//! Hint purchases
//!
//! The server owns the balance. A purchase is always attempted; refusals for
//! lack of funds come back as `ClientError::InsufficientFunds`.

use crate::error::Result;
use ladder_client::ChallengeApi;
use ladder_model::HintResult;
use ladder_progress::{ProgressError, ProgressionCache};
use tracing::{debug, info, warn};

/// Buy a hint for `slug` and record the purchase locally
///
/// # Errors
/// `GradingError::Hint` when the server refuses or cannot be reached.
pub async fn purchase_hint(
    api: &dyn ChallengeApi,
    cache: &ProgressionCache,
    slug: &str,
) -> Result<HintResult> {
    let hint = match api.purchase_hint(slug).await {
        Ok(hint) => hint,
        Err(e) => {
            warn!(slug, error = %e, "hint purchase failed");
            return Err(e.into());
        }
    };

    match cache.record_hint_purchase(slug, hint.hints_purchased) {
        Ok(count) => info!(
            slug,
            hints_purchased = count,
            coins_remaining = ?hint.coins_remaining,
            "hint purchased"
        ),
        Err(ProgressError::UnknownChallenge { .. }) => {
            debug!(slug, "hint purchased for a challenge outside the cache");
        }
        Err(e) => warn!(slug, error = %e, "hint purchase not recorded"),
    }
    Ok(hint)
}
