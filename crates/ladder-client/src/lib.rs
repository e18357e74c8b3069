//! Ladder Client
//!
//! Thin, retry-free access to the progression server:
//! - Challenge list and detail reads
//! - Submission of passing grades
//! - Hint purchases (server-side balance check)
//! - Certificate eligibility and retrieval
//!
//! Failures are typed ([`ClientError`]) so callers can tell "could not reach
//! the server" apart from "the server said no".

#![warn(unreachable_pub)]

pub mod api;
pub mod config;
pub mod error;
pub mod http;

pub use api::{hint_affordable, ChallengeApi};
pub use config::ApiConfig;
pub use error::{ClientError, Result};
pub use http::HttpChallengeApi;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
