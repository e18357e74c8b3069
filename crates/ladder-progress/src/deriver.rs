//! Ladder view derivation
//!
//! Turns the cached challenge list into the rows shown to the learner,
//! ending with the certificate entry. Pure: no I/O, no mutation of the input.

use ladder_model::{Challenge, ChallengeKind, ChallengeStatus, Level, LevelKind};
use parking_lot::Mutex;
use std::sync::Arc;

/// Slug of the synthesized certificate row
pub const CERTIFICATE_SLUG: &str = "certificate";

/// Derive the ladder rows for `challenges`
///
/// `challenges` is expected in `order` (the cache keeps it that way). Only
/// exercise rows count as real challenges. The certificate row sits after
/// the last one and is unlocked iff the highest-ordered exercise is
/// completed. A certificate row supplied by the server keeps its slug, title
/// and stars but takes the derived order and status.
///
/// An input without exercises yields no rows.
#[must_use]
pub fn derive_view(challenges: &[Challenge]) -> Vec<Level> {
    let mut levels = Vec::with_capacity(challenges.len() + 1);
    let mut last: Option<&Challenge> = None;
    let mut server_certificate: Option<&Challenge> = None;

    for challenge in challenges {
        match challenge.kind {
            ChallengeKind::Exercise => {
                if last.map_or(true, |l| challenge.order >= l.order) {
                    last = Some(challenge);
                }
                levels.push(Level::from(challenge));
            }
            ChallengeKind::Certificate => {
                server_certificate.get_or_insert(challenge);
            }
        }
    }

    let Some(last) = last else {
        return Vec::new();
    };

    let status = if last.status == ChallengeStatus::Completed {
        ChallengeStatus::Unlocked
    } else {
        ChallengeStatus::Locked
    };
    let order = last.order + 1;

    let certificate = match server_certificate {
        Some(row) => Level {
            order,
            status,
            kind: LevelKind::Certificate,
            ..Level::from(row)
        },
        None => Level {
            slug: CERTIFICATE_SLUG.to_string(),
            title: "Certificate".to_string(),
            order,
            status,
            stars: 0,
            xp_reward: 0,
            kind: LevelKind::Certificate,
        },
    };
    levels.push(certificate);
    levels
}

/// First playable challenge that is not yet completed
#[must_use]
pub fn next_playable(levels: &[Level]) -> Option<&Level> {
    levels
        .iter()
        .find(|l| l.kind == LevelKind::Challenge && l.status == ChallengeStatus::Unlocked)
}

/// Totals over the exercise rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    /// Completed exercises
    pub completed: usize,
    /// All exercises
    pub total: usize,
    /// Stars earned
    pub stars: u32,
    /// Stars available
    pub max_stars: u32,
    /// XP of completed exercises
    pub xp_earned: u64,
}

impl ProgressSummary {
    /// Whether every exercise is completed
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Summarize progress over `challenges`
///
/// `xp_earned` is an estimate from the rewards of completed exercises; the
/// server keeps the real balance.
#[must_use]
pub fn progress_summary(challenges: &[Challenge]) -> ProgressSummary {
    challenges
        .iter()
        .filter(|c| c.is_exercise())
        .fold(ProgressSummary::default(), |mut acc, c| {
            acc.total += 1;
            acc.stars += u32::from(c.stars);
            acc.max_stars += u32::from(ladder_model::MAX_STARS);
            if c.status == ChallengeStatus::Completed {
                acc.completed += 1;
                acc.xp_earned += u64::from(c.xp_reward);
            }
            acc
        })
}

/// Memoized [`derive_view`] keyed by snapshot identity
///
/// Handing in the same `Arc` allocation twice returns the same derived rows
/// without recomputing.
#[derive(Debug, Default)]
pub struct ViewMemo {
    last: Mutex<Option<(Arc<Vec<Challenge>>, Arc<Vec<Level>>)>>,
}

impl ViewMemo {
    /// Create an empty memo
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows for `snapshot`
    pub fn derive(&self, snapshot: &Arc<Vec<Challenge>>) -> Arc<Vec<Level>> {
        let mut last = self.last.lock();
        if let Some((source, levels)) = last.as_ref() {
            if Arc::ptr_eq(source, snapshot) {
                return Arc::clone(levels);
            }
        }
        let levels = Arc::new(derive_view(snapshot));
        *last = Some((Arc::clone(snapshot), Arc::clone(&levels)));
        levels
    }
}
