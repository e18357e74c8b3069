//! Scripted interpreter
//!
//! Understands just enough Python-looking lines to drive grading scenarios:
//!
//! ```text
//! print("hi")            print(42)            print(f())
//! x = 7                  def f(): return 42   def f():
//! assert f() == 42       assert True              return 42
//! raise ValueError("no") while True: pass     pass
//! sleep(3)
//! ```
//!
//! Anything else is a `SyntaxError`. `while True: pass` reports a timeout.
//! `sleep(n)` costs `n` simulated seconds against the stage's budget without
//! waiting.

use async_trait::async_trait;
use ladder_runtime::{
    ExceptionInfo, ExecutionLimits, Interpreter, Program, RawRun, RuntimeInitError,
    RuntimeProvider, SandboxError, StageRun,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
        }
    }
}

#[derive(Default)]
struct Namespace {
    functions: HashMap<String, String>,
    variables: HashMap<String, Value>,
    pending_def: Option<String>,
    clock: Duration,
}

fn syntax_error() -> ExceptionInfo {
    ExceptionInfo::new("SyntaxError", "invalid syntax")
}

fn name_error(name: &str) -> ExceptionInfo {
    ExceptionInfo::new("NameError", format!("name '{name}' is not defined"))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn string_literal(s: &str) -> Option<&str> {
    let s = s.trim();
    ['"', '\''].iter().find_map(|q| {
        s.strip_prefix(*q).and_then(|rest| rest.strip_suffix(*q))
    })
}

impl Namespace {
    fn eval(&self, expr: &str) -> Result<Value, ExceptionInfo> {
        let expr = expr.trim();
        if let Some(text) = string_literal(expr) {
            return Ok(Value::Str(text.to_string()));
        }
        if let Ok(i) = expr.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        match expr {
            "True" => return Ok(Value::Bool(true)),
            "False" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Some((lhs, rhs)) = expr.split_once("==") {
            return Ok(Value::Bool(self.eval(lhs)? == self.eval(rhs)?));
        }
        if let Some(name) = expr.strip_suffix("()") {
            if !is_identifier(name) {
                return Err(syntax_error());
            }
            let body = self.functions.get(name).ok_or_else(|| name_error(name))?;
            return self.eval(body);
        }
        if is_identifier(expr) {
            return self
                .variables
                .get(expr)
                .cloned()
                .ok_or_else(|| name_error(expr));
        }
        Err(syntax_error())
    }

    fn exec_line(
        &mut self,
        raw: &str,
        out: &mut String,
        limits: &ExecutionLimits,
    ) -> Result<(), ExceptionInfo> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        if let Some(name) = self.pending_def.take() {
            let body = line.strip_prefix("return ").ok_or_else(syntax_error)?;
            self.functions.insert(name, body.trim().to_string());
            return Ok(());
        }

        if line == "pass" {
            return Ok(());
        }
        if line == "while True: pass" {
            self.clock = limits.wall_clock;
            return Err(ExceptionInfo::timeout(limits.wall_clock));
        }

        if let Some(secs) = line.strip_prefix("sleep(").and_then(|r| r.strip_suffix(')')) {
            let secs: u64 = secs.trim().parse().map_err(|_| syntax_error())?;
            self.clock += Duration::from_secs(secs);
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix("def ") {
            let (head, tail) = rest.split_once(':').ok_or_else(syntax_error)?;
            let name = head.trim().strip_suffix("()").ok_or_else(syntax_error)?;
            if !is_identifier(name) {
                return Err(syntax_error());
            }
            let tail = tail.trim();
            if tail.is_empty() {
                self.pending_def = Some(name.to_string());
            } else {
                let body = tail.strip_prefix("return ").ok_or_else(syntax_error)?;
                self.functions.insert(name.to_string(), body.trim().to_string());
            }
            return Ok(());
        }

        if let Some(args) = line.strip_prefix("print(").and_then(|r| r.strip_suffix(')')) {
            let value = if args.trim().is_empty() {
                Value::Str(String::new())
            } else {
                self.eval(args)?
            };
            out.push_str(&value.to_string());
            out.push('\n');
            if out.len() > limits.max_output_bytes {
                return Err(ExceptionInfo::new("MemoryError", "output limit exceeded"));
            }
            return Ok(());
        }

        if let Some(cond) = line.strip_prefix("assert ") {
            return match self.eval(cond)? {
                Value::Bool(true) => Ok(()),
                Value::Int(i) if i != 0 => Ok(()),
                Value::Str(s) if !s.is_empty() => Ok(()),
                _ => Err(ExceptionInfo::new("AssertionError", "")),
            };
        }

        if let Some(rest) = line.strip_prefix("raise ") {
            let (kind, message) = match rest.split_once('(') {
                Some((kind, args)) => {
                    let args = args.strip_suffix(')').ok_or_else(syntax_error)?;
                    (kind, string_literal(args).unwrap_or(args).to_string())
                }
                None => (rest, String::new()),
            };
            if !is_identifier(kind.trim()) {
                return Err(syntax_error());
            }
            return Err(ExceptionInfo::new(kind.trim(), message));
        }

        if let Some((name, expr)) = line.split_once('=') {
            let name = name.trim();
            if is_identifier(name) && !expr.starts_with('=') {
                let value = self.eval(expr)?;
                self.variables.insert(name.to_string(), value);
                return Ok(());
            }
        }

        Err(syntax_error())
    }

    fn exec(
        &mut self,
        source: &str,
        out: &mut String,
        limits: &ExecutionLimits,
    ) -> Result<(), ExceptionInfo> {
        for line in source.lines() {
            self.exec_line(line, out, limits)?;
        }
        if self.pending_def.take().is_some() {
            return Err(ExceptionInfo::new("IndentationError", "expected an indented block"));
        }
        Ok(())
    }
}

/// In-process [`Interpreter`] for tests
#[derive(Default)]
pub struct ScriptedInterpreter {
    runs: Mutex<Vec<Program>>,
    host_failure: Mutex<Option<SandboxError>>,
    delay: Mutex<Duration>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every program run so far, in order
    pub fn runs(&self) -> Vec<Program> {
        self.runs.lock().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    /// Make every following run fail on the host side
    pub fn fail_with(&self, error: SandboxError) {
        *self.host_failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        self.host_failure.lock().take();
    }

    /// Sleep this long inside every run
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    fn fingerprint(&self) -> &str {
        "scripted"
    }

    async fn run(&self, program: Program, limits: ExecutionLimits) -> Result<RawRun, SandboxError> {
        self.runs.lock().push(program.clone());

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.host_failure.lock().clone() {
            return Err(error);
        }

        let mut namespace = Namespace::default();
        let mut stages = Vec::with_capacity(program.len());
        let mut total = Duration::ZERO;
        for source in &program.stages {
            namespace.clock = Duration::from_millis(1);
            let mut stdout = String::new();
            let exception = namespace.exec(source, &mut stdout, &limits).err();
            total += namespace.clock;
            let raised = exception.is_some();
            stages.push(StageRun {
                stdout,
                exception,
                elapsed: namespace.clock,
            });
            if raised {
                break;
            }
        }
        Ok(RawRun {
            stages,
            elapsed: total,
        })
    }
}

/// [`RuntimeProvider`] handing out one shared [`ScriptedInterpreter`]
pub struct ScriptedProvider {
    interpreter: Arc<ScriptedInterpreter>,
    boots: AtomicUsize,
    failures_left: AtomicUsize,
    boot_delay: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            interpreter: Arc::new(ScriptedInterpreter::new()),
            boots: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            boot_delay: Duration::ZERO,
        }
    }

    /// Fail the first `n` boots with `RuntimeInitError::ModuleNotFound`
    #[must_use]
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every boot
    #[must_use]
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn interpreter(&self) -> Arc<ScriptedInterpreter> {
        Arc::clone(&self.interpreter)
    }

    pub fn boot_count(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeProvider for ScriptedProvider {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn boot(&self) -> Result<Arc<dyn Interpreter>, RuntimeInitError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if !self.boot_delay.is_zero() {
            tokio::time::sleep(self.boot_delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RuntimeInitError::ModuleNotFound {
                path: "python.wasm".into(),
            });
        }

        Ok(Arc::clone(&self.interpreter) as Arc<dyn Interpreter>)
    }
}
