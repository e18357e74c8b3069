//! Ladder Core
//!
//! Composition root for the grading and progression pipeline:
//! - [`LadderConfig`]: TOML configuration with environment overrides
//! - [`LadderSession`]: runtime, cache and grading coordinator wired together
//! - [`LadderError`]: one error type with learner-facing messages
//!
//! # Example
//!
//! ```rust,ignore
//! use ladder_core::{LadderConfig, LadderSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LadderConfig::from_file("ladder.toml")?.apply_env();
//! let session = LadderSession::connect(config)?;
//! session.warm_up();
//!
//! let report = session.grade("level-1", "print('hello')").await?;
//! println!("{}", report.grade.message());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod session;

pub use config::{
    CacheSettings, ConfigError, LadderConfig, RuntimeSettings, ENV_API_TOKEN, ENV_API_URL,
    ENV_PYTHON_WASM,
};
pub use error::{LadderError, Result, INSUFFICIENT_FUNDS_MESSAGE, OFFLINE_MESSAGE};
pub use session::{CertificateStatus, LadderSession};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
