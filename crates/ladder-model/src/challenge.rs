//! Challenge records
//!
//! A challenge is identified by its `slug` and sequenced by `order`.
//! Status only ever moves forward: `Locked -> Unlocked -> Completed`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest star rating a challenge can award
pub const MAX_STARS: u8 = 3;

/// Progress status of a challenge
///
/// The derived ordering follows the progression direction, so advancing a
/// status is `max(current, next)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
    /// Not yet reachable
    Locked,
    /// Playable
    Unlocked,
    /// Solved at least once
    Completed,
}

impl ChallengeStatus {
    /// Advance towards `next`, never regressing
    #[inline]
    #[must_use]
    pub fn advance(self, next: ChallengeStatus) -> ChallengeStatus {
        self.max(next)
    }

    /// Whether the learner may open the challenge
    #[inline]
    #[must_use]
    pub fn is_playable(self) -> bool {
        !matches!(self, ChallengeStatus::Locked)
    }
}

impl Default for ChallengeStatus {
    fn default() -> Self {
        ChallengeStatus::Locked
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeStatus::Locked => "LOCKED",
            ChallengeStatus::Unlocked => "UNLOCKED",
            ChallengeStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// Whether a row is a real exercise or a server-materialized certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Graded exercise
    #[default]
    Exercise,
    /// Terminal certificate entry
    Certificate,
}

/// A single rung of the ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Unique, stable identifier
    pub slug: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Position in the total sequence
    pub order: i64,
    /// Current progress status
    #[serde(default)]
    pub status: ChallengeStatus,
    /// Best star rating earned (0-3)
    #[serde(default)]
    pub stars: u8,
    /// XP awarded on first completion
    #[serde(default)]
    pub xp_reward: u32,
    /// Seed code shown in the editor
    #[serde(default)]
    pub initial_code: String,
    /// Hidden verification script
    #[serde(default)]
    pub test_code: Option<String>,
    /// Wall-clock budget for a sandbox run, in seconds
    #[serde(default)]
    pub time_limit: Option<u32>,
    /// Hints bought for this challenge
    #[serde(default)]
    pub hints_purchased: u32,
    /// Row kind
    #[serde(default)]
    pub kind: ChallengeKind,
}

impl Challenge {
    /// Create a locked exercise with empty code
    #[must_use]
    pub fn new(slug: impl Into<String>, order: i64) -> Self {
        Self {
            slug: slug.into(),
            title: String::new(),
            order,
            status: ChallengeStatus::Locked,
            stars: 0,
            xp_reward: 0,
            initial_code: String::new(),
            test_code: None,
            time_limit: None,
            hints_purchased: 0,
            kind: ChallengeKind::Exercise,
        }
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ChallengeStatus) -> Self {
        self.status = status;
        self
    }

    /// With stars (clamped to [`MAX_STARS`])
    #[inline]
    #[must_use]
    pub fn with_stars(mut self, stars: u8) -> Self {
        self.stars = stars.min(MAX_STARS);
        self
    }

    /// With verification script
    #[inline]
    #[must_use]
    pub fn with_test_code(mut self, test_code: impl Into<String>) -> Self {
        self.test_code = Some(test_code.into());
        self
    }

    /// With XP reward
    #[inline]
    #[must_use]
    pub fn with_xp_reward(mut self, xp: u32) -> Self {
        self.xp_reward = xp;
        self
    }

    /// With time limit in seconds
    #[inline]
    #[must_use]
    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit = Some(secs);
        self
    }

    /// With row kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: ChallengeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Verification script, if one is defined and non-blank
    #[must_use]
    pub fn verification_script(&self) -> Option<&str> {
        self.test_code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
    }

    /// Whether this row is a real exercise
    #[inline]
    #[must_use]
    pub fn is_exercise(&self) -> bool {
        self.kind == ChallengeKind::Exercise
    }
}
