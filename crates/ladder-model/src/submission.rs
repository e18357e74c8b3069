//! Submission and hint records

use serde::{Deserialize, Serialize};

/// Body of `POST /challenges/{slug}/submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    /// Whether the local grade passed
    pub passed: bool,
}

impl SubmissionPayload {
    /// Payload reporting a passing grade
    #[inline]
    #[must_use]
    pub fn passed() -> Self {
        Self { passed: true }
    }
}

/// Server verdict on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// First completion recorded
    Completed,
    /// Challenge was already completed; nothing changed server-side
    AlreadyCompleted,
    /// Server refused the submission
    Failed,
}

impl SubmissionStatus {
    /// Whether the server acknowledged the challenge as completed
    #[inline]
    #[must_use]
    pub fn is_acknowledged(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Completed | SubmissionStatus::AlreadyCompleted
        )
    }
}

/// Response of `POST /challenges/{slug}/submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    /// Server verdict
    pub status: SubmissionStatus,
    /// Stars awarded for this attempt
    #[serde(default)]
    pub stars: u8,
    /// XP credited by this attempt
    #[serde(default)]
    pub xp_earned: u32,
    /// Challenge the server unlocked next, if any
    #[serde(default)]
    pub next_level_slug: Option<String>,
}

impl SubmissionResult {
    /// Create a `completed` result
    #[must_use]
    pub fn completed(stars: u8, xp_earned: u32) -> Self {
        Self {
            status: SubmissionStatus::Completed,
            stars,
            xp_earned,
            next_level_slug: None,
        }
    }

    /// With next level pointer
    #[inline]
    #[must_use]
    pub fn with_next_level(mut self, slug: impl Into<String>) -> Self {
        self.next_level_slug = Some(slug.into());
        self
    }
}

/// Response of `POST /challenges/{slug}/purchase_ai_assist`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintResult {
    /// Hint text
    #[serde(default)]
    pub hint: String,
    /// Currency left after the purchase
    #[serde(default)]
    pub coins_remaining: Option<u64>,
    /// Server-side count of hints bought for the challenge
    #[serde(default)]
    pub hints_purchased: Option<u32>,
}
