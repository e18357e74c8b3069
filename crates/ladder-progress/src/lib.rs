//! Ladder Progress
//!
//! Client-side view of the learner's progression:
//! - [`ProgressionCache`]: read-through cache of the challenge list with a
//!   freshness window, single-flight fetches and optimistic patches
//! - [`derive_view`]: pure derivation of the ladder rows, including the
//!   terminal certificate entry
//!
//! The server stays the source of truth. Optimistic patches are visible
//! immediately and are overwritten by the next authoritative fetch.

#![warn(unreachable_pub)]

pub mod cache;
pub mod deriver;
pub mod error;

pub use cache::{CacheOptions, ProgressionCache, DEFAULT_FRESHNESS};
pub use deriver::{
    derive_view, next_playable, progress_summary, ProgressSummary, ViewMemo, CERTIFICATE_SLUG,
};
pub use error::{ProgressError, Result};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
