//! Ladder data model
//!
//! Records exchanged with the progression server and held by the client cache:
//! - Challenges and their forward-only status
//! - Submission results returned after a passing grade
//! - Hint purchases and certificate records
//! - Derived view rows ([`Level`]) consumed by presentation code
//!
//! Every type here is plain data. Consistency rules live in `ladder-progress`.

#![warn(unreachable_pub)]

pub mod certificate;
pub mod challenge;
pub mod level;
pub mod submission;

pub use certificate::{CertificateEligibility, CertificateRecord};
pub use challenge::{Challenge, ChallengeKind, ChallengeStatus, MAX_STARS};
pub use level::{Level, LevelKind};
pub use submission::{HintResult, SubmissionPayload, SubmissionResult, SubmissionStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
