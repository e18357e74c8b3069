//! WASI CPython backend
//!
//! # Flow
//!
//! 1. `boot()` reads the `python.wasm` image, fingerprints it (SHA-256),
//!    compiles it on a blocking worker and starts the epoch ticker
//! 2. `run()` moves each invocation to a blocking worker
//! 3. Every invocation gets a fresh `Store` with its own stdin/stdout/stderr
//!    memory pipes, a memory ceiling and an epoch deadline
//! 4. A small harness (`harness.py`) runs the stages in one namespace and
//!    writes a `start` and an `end` line per stage to stderr, tagged with a
//!    nonce generated for this invocation
//!
//! Only tagged lines count. A stage without an `end` line did not complete,
//! whatever the exit status says.

use crate::error::{RuntimeInitError, SandboxError};
use crate::interpreter::{
    ExceptionInfo, Interpreter, Program, RawRun, RuntimeProvider, StageRun,
};
use crate::limits::ExecutionLimits;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ulid::Ulid;
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::p2::WasiCtxBuilder;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit};

const HARNESS: &str = include_str!("harness.py");
const EPOCH_TICK: Duration = Duration::from_millis(10);
/// Room on stderr beyond the JSON-encoded stage output
const STDERR_SLACK: usize = 256 * 1024;

/// Location of the interpreter image and its standard library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasiPythonConfig {
    /// Path to `python.wasm`
    pub module_path: PathBuf,
    /// Host directory holding `python3.x/`, mounted read-only
    #[serde(default)]
    pub stdlib_dir: Option<PathBuf>,
    /// Guest mount point for `stdlib_dir`
    #[serde(default = "default_guest_stdlib")]
    pub guest_stdlib_dir: String,
}

fn default_guest_stdlib() -> String {
    "/usr/local/lib".to_string()
}

impl WasiPythonConfig {
    /// Config for a self-contained image
    #[must_use]
    pub fn new(module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: module_path.into(),
            stdlib_dir: None,
            guest_stdlib_dir: default_guest_stdlib(),
        }
    }

    /// With host standard library directory
    #[inline]
    #[must_use]
    pub fn with_stdlib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stdlib_dir = Some(dir.into());
        self
    }
}

/// Boots [`WasiPython`] interpreters
#[derive(Debug, Clone)]
pub struct WasiPythonProvider {
    config: WasiPythonConfig,
}

impl WasiPythonProvider {
    /// Create provider
    #[inline]
    #[must_use]
    pub fn new(config: WasiPythonConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl RuntimeProvider for WasiPythonProvider {
    fn describe(&self) -> String {
        format!("wasi-python({})", self.config.module_path.display())
    }

    async fn boot(&self) -> Result<Arc<dyn Interpreter>, RuntimeInitError> {
        let path = self.config.module_path.clone();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RuntimeInitError::ModuleNotFound { path });
            }
            Err(e) => {
                return Err(RuntimeInitError::ModuleUnreadable {
                    path,
                    message: e.to_string(),
                });
            }
        };
        let fingerprint = sha256_hex(&bytes);

        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| RuntimeInitError::Engine(e.to_string()))?;

        let compile_engine = engine.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&compile_engine, &bytes))
            .await
            .map_err(|e| RuntimeInitError::BootTask(e.to_string()))?
            .map_err(|e| RuntimeInitError::Compile(format!("{e:#}")))?;

        debug!(fingerprint = %fingerprint, "compiled python runtime image");

        let ticker = spawn_epoch_ticker(engine.clone());
        Ok(Arc::new(WasiPython {
            engine,
            module,
            fingerprint,
            stdlib: self
                .config
                .stdlib_dir
                .clone()
                .map(|dir| (dir, self.config.guest_stdlib_dir.clone())),
            ticker,
        }))
    }
}

/// Drives epoch interruption; every store's deadline is measured in ticks
fn spawn_epoch_ticker(engine: Engine) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EPOCH_TICK);
        loop {
            interval.tick().await;
            engine.increment_epoch();
        }
    })
}

/// Booted CPython image
pub struct WasiPython {
    engine: Engine,
    module: Module,
    fingerprint: String,
    stdlib: Option<(PathBuf, String)>,
    ticker: JoinHandle<()>,
}

impl Drop for WasiPython {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[async_trait::async_trait]
impl Interpreter for WasiPython {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn run(&self, program: Program, limits: ExecutionLimits) -> Result<RawRun, SandboxError> {
        let engine = self.engine.clone();
        let module = self.module.clone();
        let stdlib = self.stdlib.clone();

        // Wasmtime execution is synchronous; keep it off the reactor.
        tokio::task::spawn_blocking(move || {
            execute_sync(&engine, &module, stdlib.as_ref(), &program, &limits)
        })
        .await
        .map_err(|e| SandboxError::Worker(e.to_string()))?
    }
}

struct SandboxState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// What the harness reads from stdin
#[derive(Serialize)]
struct HarnessRequest<'a> {
    nonce: &'a str,
    stages: &'a [String],
    max_output_bytes: usize,
}

/// How the guest stopped
#[derive(Debug)]
enum Ending {
    Exited(i32),
    Interrupted,
    Trapped(String),
}

fn execute_sync(
    engine: &Engine,
    module: &Module,
    stdlib: Option<&(PathBuf, String)>,
    program: &Program,
    limits: &ExecutionLimits,
) -> Result<RawRun, SandboxError> {
    let started = Instant::now();
    let nonce = Ulid::new().to_string();

    let request = serde_json::to_vec(&HarnessRequest {
        nonce: &nonce,
        stages: &program.stages,
        max_output_bytes: limits.max_output_bytes,
    })
    .map_err(|e| SandboxError::Setup(e.to_string()))?;
    // Stage output travels inside the stderr reports; fd 1 only sees writes
    // that bypass the capture, and those are dropped.
    let stdout_pipe = MemoryOutputPipe::new(limits.max_output_bytes);
    let stderr_pipe = MemoryOutputPipe::new(
        limits
            .max_output_bytes
            .saturating_mul(4)
            .saturating_add(STDERR_SLACK),
    );

    let mut wasi_builder = WasiCtxBuilder::new();
    wasi_builder
        .args(&["python", "-I", "-B", "-c", HARNESS])
        .stdin(MemoryInputPipe::new(request))
        .stdout(stdout_pipe)
        .stderr(stderr_pipe.clone());

    if let Some((host_dir, guest_dir)) = stdlib {
        wasi_builder
            .preopened_dir(host_dir, guest_dir, DirPerms::READ, FilePerms::READ)
            .map_err(|e| SandboxError::Setup(format!("cannot mount stdlib: {e}")))?;
    }

    let state = SandboxState {
        wasi: wasi_builder.build_p1(),
        limits: StoreLimitsBuilder::new()
            .memory_size(limits.max_memory_bytes)
            .build(),
    };
    let mut store = Store::new(engine, state);
    store.limiter(|state| &mut state.limits);
    store.set_epoch_deadline(deadline_ticks(limits.invocation_budget(program.len())));
    store.epoch_deadline_trap();

    let mut linker: Linker<SandboxState> = Linker::new(engine);
    preview1::add_to_linker_sync(&mut linker, |state: &mut SandboxState| &mut state.wasi)
        .map_err(|e| SandboxError::Setup(format!("failed to link WASI: {e}")))?;

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| SandboxError::Instantiate(format!("{e:#}")))?;
    let start_fn = instance
        .get_typed_func::<(), ()>(&mut store, "_start")
        .map_err(|e| SandboxError::Instantiate(format!("no _start entry point: {e}")))?;

    let ending = match start_fn.call(&mut store, ()) {
        Ok(()) => Ending::Exited(0),
        Err(e) => {
            if let Some(exit) = e.downcast_ref::<I32Exit>() {
                Ending::Exited(exit.0)
            } else if matches!(e.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
                warn!(
                    budget_ms = limits.wall_clock.as_millis() as u64,
                    stages = program.len(),
                    "sandbox run hit wall-clock budget"
                );
                Ending::Interrupted
            } else {
                Ending::Trapped(format!("{e:#}"))
            }
        }
    };

    let stderr = pipe_text(&stderr_pipe);
    let transcript = parse_transcript(&stderr, &nonce)?;
    let elapsed = started.elapsed();
    let stages = transcript.settle(program.len(), ending, elapsed, limits.wall_clock, stderr)?;

    Ok(RawRun { stages, elapsed })
}

/// Ticks until the epoch deadline fires; at least one full tick of slack
fn deadline_ticks(budget: Duration) -> u64 {
    let ticks = budget.as_millis() / EPOCH_TICK.as_millis();
    u64::try_from(ticks).unwrap_or(u64::MAX).saturating_add(1)
}

fn pipe_text(pipe: &MemoryOutputPipe) -> String {
    String::from_utf8_lossy(&pipe.contents()).into_owned()
}

#[derive(Deserialize)]
struct StageStart {
    stage: usize,
}

#[derive(Deserialize)]
struct StageReport {
    stage: usize,
    #[serde(default)]
    stdout: String,
    exception: Option<ExceptionInfo>,
    elapsed_ms: f64,
}

/// Stage events the harness reported under one nonce
#[derive(Debug, Default)]
struct Transcript {
    started: usize,
    finished: Vec<StageRun>,
}

impl Transcript {
    /// Close the transcript once the guest has stopped
    ///
    /// The stage that was running (or due to run) when the guest stopped
    /// gets an exception describing the stop. A guest that never started a
    /// stage and failed is a host-side failure.
    fn settle(
        self,
        expected: usize,
        ending: Ending,
        elapsed: Duration,
        budget: Duration,
        stderr: String,
    ) -> Result<Vec<StageRun>, SandboxError> {
        let Self {
            started,
            mut finished,
        } = self;
        let raised = finished.last().is_some_and(|stage| stage.exception.is_some());
        if finished.len() >= expected || raised {
            return Ok(finished);
        }

        let exception = match ending {
            Ending::Interrupted => ExceptionInfo::timeout(budget),
            Ending::Exited(code) if code != 0 && started == 0 => {
                return Err(SandboxError::Crashed { code, stderr });
            }
            Ending::Exited(code) => ExceptionInfo::exited(format_args!("exit code {code}")),
            Ending::Trapped(message) if started == 0 => return Err(SandboxError::Trap(message)),
            Ending::Trapped(message) => {
                ExceptionInfo::new("SystemError", format!("interpreter trapped: {message}"))
            }
        };

        let spent: Duration = finished.iter().map(|stage| stage.elapsed).sum();
        finished.push(StageRun {
            stdout: String::new(),
            exception: Some(exception),
            elapsed: elapsed.saturating_sub(spent),
        });
        Ok(finished)
    }
}

fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, SandboxError> {
    serde_json::from_str(json).map_err(|e| SandboxError::MalformedReport(e.to_string()))
}

fn out_of_order(stage: usize) -> SandboxError {
    SandboxError::MalformedReport(format!("stage {stage} reported out of order"))
}

/// Collect the nonce-tagged stage events from stderr
fn parse_transcript(stderr: &str, nonce: &str) -> Result<Transcript, SandboxError> {
    let mut transcript = Transcript::default();
    for line in stderr.lines() {
        let Some(event) = line
            .strip_prefix(nonce)
            .and_then(|rest| rest.strip_prefix(' '))
        else {
            continue;
        };

        if let Some(json) = event.strip_prefix("start ") {
            let start: StageStart = decode(json)?;
            let next = transcript.finished.len();
            if start.stage != next || transcript.started != next {
                return Err(out_of_order(start.stage));
            }
            transcript.started = next + 1;
        } else if let Some(json) = event.strip_prefix("end ") {
            let report: StageReport = decode(json)?;
            let next = transcript.finished.len();
            if report.stage != next || transcript.started != next + 1 {
                return Err(out_of_order(report.stage));
            }
            transcript.finished.push(StageRun {
                stdout: report.stdout,
                exception: report.exception,
                elapsed: Duration::try_from_secs_f64(report.elapsed_ms / 1000.0)
                    .unwrap_or_default(),
            });
        } else {
            return Err(SandboxError::MalformedReport(format!(
                "unknown harness event: {event}"
            )));
        }
    }
    Ok(transcript)
}

/// Compute SHA-256 hex digest of the runtime image
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NONCE: &str = "01J9ZQ4X7D2M8V0C3K5N6P7R8S";

    fn stage_lines(events: &[&str]) -> String {
        events
            .iter()
            .map(|event| format!("{NONCE} {event}\n"))
            .collect()
    }

    #[test]
    fn parses_stage_reports() {
        let stderr = format!(
            "warning: something\n{}",
            stage_lines(&[
                r#"start {"stage":0}"#,
                r#"end {"stage":0,"stdout":"hi\n","exception":null,"elapsed_ms":500.0}"#,
                r#"start {"stage":1}"#,
                concat!(
                    r#"end {"stage":1,"stdout":"","#,
                    r#""exception":{"type":"AssertionError","message":"","traceback":"Traceback..."},"#,
                    r#""elapsed_ms":1.0}"#
                ),
            ])
        );
        let transcript = parse_transcript(&stderr, NONCE).unwrap();

        assert_eq!(transcript.finished.len(), 2);
        assert_eq!(transcript.finished[0].stdout, "hi\n");
        assert_eq!(transcript.finished[0].elapsed, Duration::from_millis(500));
        let exc = transcript.finished[1].exception.as_ref().unwrap();
        assert_eq!(exc.kind, "AssertionError");
        assert_eq!(exc.traceback.as_deref(), Some("Traceback..."));
    }

    #[test]
    fn untagged_lines_are_ignored() {
        let stderr = "__LADDER_EXCEPTION__ done\nOTHERNONCE end {\"stage\":0}\n";
        let transcript = parse_transcript(stderr, NONCE).unwrap();
        assert_eq!(transcript.started, 0);
        assert!(transcript.finished.is_empty());
    }

    #[test]
    fn malformed_or_reordered_reports_are_errors() {
        let stderr = stage_lines(&["start {not json"]);
        assert!(matches!(
            parse_transcript(&stderr, NONCE),
            Err(SandboxError::MalformedReport(_))
        ));

        let stderr = stage_lines(&[r#"end {"stage":0,"exception":null,"elapsed_ms":1.0}"#]);
        assert!(matches!(
            parse_transcript(&stderr, NONCE),
            Err(SandboxError::MalformedReport(_))
        ));
    }

    #[test]
    fn clean_exit_without_report_is_not_completion() {
        let stages = Transcript::default()
            .settle(
                1,
                Ending::Exited(0),
                Duration::from_millis(3),
                Duration::from_secs(5),
                String::new(),
            )
            .unwrap();

        assert_eq!(stages.len(), 1);
        assert!(stages[0].exception.as_ref().unwrap().is_exit());
    }

    #[test]
    fn exit_during_verification_fails_that_stage() {
        let stderr = stage_lines(&[
            r#"start {"stage":0}"#,
            r#"end {"stage":0,"stdout":"","exception":null,"elapsed_ms":1.0}"#,
            r#"start {"stage":1}"#,
        ]);
        let stages = parse_transcript(&stderr, NONCE)
            .unwrap()
            .settle(2, Ending::Exited(0), Duration::from_millis(5), Duration::from_secs(5), stderr)
            .unwrap();

        assert!(stages[0].exception.is_none());
        assert!(stages[1].exception.as_ref().unwrap().is_exit());
    }

    #[test]
    fn interrupt_times_out_the_running_stage() {
        let stderr = stage_lines(&[r#"start {"stage":0}"#]);
        let stages = parse_transcript(&stderr, NONCE)
            .unwrap()
            .settle(2, Ending::Interrupted, Duration::from_secs(10), Duration::from_secs(5), stderr)
            .unwrap();

        assert_eq!(stages.len(), 1);
        assert!(stages[0].exception.as_ref().unwrap().is_timeout());
        assert_eq!(stages[0].elapsed, Duration::from_secs(10));
    }

    #[test]
    fn failure_before_any_stage_is_a_crash() {
        let result = Transcript::default().settle(
            1,
            Ending::Exited(1),
            Duration::ZERO,
            Duration::from_secs(5),
            "Fatal Python error".into(),
        );
        assert!(matches!(result, Err(SandboxError::Crashed { code: 1, .. })));

        let result = Transcript::default().settle(
            1,
            Ending::Trapped("unreachable".into()),
            Duration::ZERO,
            Duration::from_secs(5),
            String::new(),
        );
        assert!(matches!(result, Err(SandboxError::Trap(_))));
    }

    #[test]
    fn deadline_has_slack() {
        assert_eq!(deadline_ticks(Duration::from_secs(5)), 501);
        assert_eq!(deadline_ticks(Duration::ZERO), 1);
    }

    #[test]
    fn sha256_deterministic() {
        let a = sha256_hex(b"python.wasm");
        assert_eq!(a, sha256_hex(b"python.wasm"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha256_hex(b"other"));
    }

    #[test]
    fn harness_reads_nonce_from_request() {
        assert!(HARNESS.contains("request.pop(\"nonce\")"));
        assert!(HARNESS.contains("b\"start\"") && HARNESS.contains("b\"end\""));
    }

    #[tokio::test]
    async fn boot_reports_missing_module() {
        let tmp = TempDir::new().unwrap();
        let provider =
            WasiPythonProvider::new(WasiPythonConfig::new(tmp.path().join("python.wasm")));

        let result = provider.boot().await;
        assert!(matches!(result, Err(RuntimeInitError::ModuleNotFound { .. })));
    }

    #[tokio::test]
    async fn boot_rejects_invalid_module() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("python.wasm");
        std::fs::write(&path, b"definitely not wasm").unwrap();

        let provider = WasiPythonProvider::new(WasiPythonConfig::new(&path));
        let result = provider.boot().await;
        assert!(matches!(result, Err(RuntimeInitError::Compile(_))));
    }
}
