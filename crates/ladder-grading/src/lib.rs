//! Ladder Grading
//!
//! Turns a learner's code into a durable result:
//! 1. run the code in the embedded runtime and capture its output
//! 2. run the challenge's hidden verification script in the same scope
//! 3. submit a passing grade and patch the progression cache on success
//!
//! [`GradingCoordinator`] enforces one attempt at a time and publishes its
//! [`GradingPhase`] through a watch channel. Phase changes are validated
//! against [`allowed_transitions`].

#![warn(unreachable_pub)]

pub mod coordinator;
pub mod error;
pub mod hints;
pub mod outcome;
pub mod phase;

pub use coordinator::GradingCoordinator;
pub use error::{GradingError, Result};
pub use hints::purchase_hint;
pub use outcome::{
    GradeOutcome, GradingReport, RunId, SubmissionOutcome, NO_TESTS_NOTE,
    VERIFICATION_FAILED_MESSAGE,
};
pub use phase::{allowed_transitions, validate_transition, GradingPhase, TransitionError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
