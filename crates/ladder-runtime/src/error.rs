//! Error types for the embedded runtime
//!
//! Both enums are `Clone`: a single boot failure is fanned out to every
//! caller waiting on that boot.

use std::path::PathBuf;

/// The embedded interpreter failed to load
///
/// Never cached: the next `ensure_runtime` call starts a new boot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeInitError {
    /// Module file does not exist
    #[error("runtime module not found at {}", path.display())]
    ModuleNotFound {
        /// Configured module path
        path: PathBuf,
    },

    /// Module file exists but could not be read
    #[error("failed to read runtime module {}: {message}", path.display())]
    ModuleUnreadable {
        /// Configured module path
        path: PathBuf,
        /// I/O error text
        message: String,
    },

    /// Engine configuration rejected
    #[error("failed to configure runtime engine: {0}")]
    Engine(String),

    /// Module failed validation or compilation
    #[error("failed to compile runtime module: {0}")]
    Compile(String),

    /// Background boot task panicked or was cancelled
    #[error("runtime boot task failed: {0}")]
    BootTask(String),
}

/// Host-side failure while running code in the sandbox
///
/// Exceptions raised by the code itself are not errors; they are reported in
/// [`crate::ExecutionOutput::error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    /// Store, pipes or program encoding could not be prepared
    #[error("failed to prepare sandbox: {0}")]
    Setup(String),

    /// Module could not be instantiated
    #[error("failed to instantiate runtime: {0}")]
    Instantiate(String),

    /// Runtime trapped for a reason other than the wall-clock budget
    #[error("runtime trapped: {0}")]
    Trap(String),

    /// Interpreter exited abnormally without reporting an exception
    #[error("interpreter exited with code {code} without an exception report")]
    Crashed {
        /// Process exit code
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// Exception report could not be decoded
    #[error("malformed exception report: {0}")]
    MalformedReport(String),

    /// Blocking worker panicked or was cancelled
    #[error("sandbox worker failed: {0}")]
    Worker(String),
}
