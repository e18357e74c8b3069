//! Testing utilities for the Ladder workspace
//!
//! Shared fakes and fixtures: a scripted interpreter standing in for the
//! embedded runtime, and an in-memory progression server.

#![allow(missing_docs)]

pub mod api;
pub mod interpreter;

pub use api::FakeApi;
pub use interpreter::{ScriptedInterpreter, ScriptedProvider};

use ladder_model::{Challenge, ChallengeStatus};
use ladder_runtime::{RuntimeManager, RuntimeProvider};
use std::sync::Arc;

pub fn challenge(slug: &str, order: i64, status: ChallengeStatus) -> Challenge {
    Challenge::new(slug, order)
        .with_status(status)
        .with_xp_reward(50)
}

/// `level-1 ..= level-n`; the first is unlocked, the rest locked
pub fn ladder(n: usize) -> Vec<Challenge> {
    (1..=n)
        .map(|i| {
            let status = if i == 1 {
                ChallengeStatus::Unlocked
            } else {
                ChallengeStatus::Locked
            };
            challenge(&format!("level-{i}"), i as i64, status)
        })
        .collect()
}

/// Manager over a fresh [`ScriptedProvider`], returned alongside it
pub fn scripted_runtime() -> (RuntimeManager, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new());
    let manager = RuntimeManager::new(Arc::clone(&provider) as Arc<dyn RuntimeProvider>);
    (manager, provider)
}
