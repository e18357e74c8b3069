//! Derived view rows

use crate::challenge::{Challenge, ChallengeStatus};
use serde::{Deserialize, Serialize};

/// Kind of a derived row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    /// Real challenge
    Challenge,
    /// Terminal certificate entry
    Certificate,
}

/// One row of the ladder as presented to the learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Challenge slug, or the certificate slug
    pub slug: String,
    /// Display title
    pub title: String,
    /// Position in the ladder
    pub order: i64,
    /// Derived status
    pub status: ChallengeStatus,
    /// Stars earned
    pub stars: u8,
    /// XP reward
    pub xp_reward: u32,
    /// Row kind
    pub kind: LevelKind,
}

impl Level {
    /// Whether this is the certificate row
    #[inline]
    #[must_use]
    pub fn is_certificate(&self) -> bool {
        self.kind == LevelKind::Certificate
    }
}

impl From<&Challenge> for Level {
    fn from(challenge: &Challenge) -> Self {
        Self {
            slug: challenge.slug.clone(),
            title: challenge.title.clone(),
            order: challenge.order,
            status: challenge.status,
            stars: challenge.stars,
            xp_reward: challenge.xp_reward,
            kind: LevelKind::Challenge,
        }
    }
}
