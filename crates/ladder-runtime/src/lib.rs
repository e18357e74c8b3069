//! Ladder Runtime
//!
//! Embedded interpreter lifecycle and sandboxed execution.
//!
//! # Components
//!
//! - **Loader** ([`RuntimeManager`]): boots exactly one interpreter per session,
//!   shares the boot among concurrent callers, retries after failure, and
//!   publishes readiness through a watch channel.
//! - **Sandbox** ([`Sandbox`]): runs one or more stages per invocation in a
//!   single namespace with a private stdout capture per stage and reports
//!   exceptions as data.
//! - **Backend** ([`wasi::WasiPythonProvider`]): CPython compiled to
//!   `wasm32-wasi`, executed in a fresh wasmtime store per invocation with an
//!   epoch-based wall-clock budget and a memory ceiling.
//!
//! ```text
//! RuntimeManager::ensure_runtime() ──► RuntimeHandle ──► Sandbox::run(scope)
//!          │                                                  │
//!   RuntimeProvider::boot()                     Interpreter::run(Program, limits)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ladder_runtime::{RuntimeManager, Sandbox};
//! use ladder_runtime::wasi::{WasiPythonConfig, WasiPythonProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = WasiPythonProvider::new(WasiPythonConfig::new("python.wasm"));
//! let runtime = RuntimeManager::new(Arc::new(provider));
//!
//! let handle = runtime.ensure_runtime().await?;
//! let output = Sandbox::default().execute(&handle, "print('hi')").await?;
//! assert_eq!(output.output_lines, vec!["hi"]);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod interpreter;
pub mod limits;
pub mod manager;
pub mod sandbox;
pub mod wasi;

pub use error::{RuntimeInitError, SandboxError};
pub use interpreter::{ExceptionInfo, Interpreter, Program, RawRun, RuntimeProvider, StageRun};
pub use limits::ExecutionLimits;
pub use manager::{RuntimeHandle, RuntimeManager};
pub use sandbox::{ExecutionOutput, ExecutionScope, Sandbox};
pub use wasi::{WasiPythonConfig, WasiPythonProvider};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
