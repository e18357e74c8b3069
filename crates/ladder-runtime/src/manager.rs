//! Runtime loader
//!
//! [`RuntimeManager`] owns the session's single interpreter. The first
//! `ensure_runtime` call starts a boot; callers arriving while it runs share
//! the same future. Success is stored write-once. Failure is handed to every
//! sharer and then forgotten, so the next call boots again.

use crate::error::RuntimeInitError;
use crate::interpreter::{Interpreter, RuntimeProvider};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

type BootFuture = Shared<BoxFuture<'static, Result<RuntimeHandle, RuntimeInitError>>>;

/// Shared reference to a booted interpreter
#[derive(Clone)]
pub struct RuntimeHandle {
    interpreter: Arc<dyn Interpreter>,
    booted_at: Instant,
}

impl RuntimeHandle {
    /// Wrap a booted interpreter
    #[must_use]
    pub fn new(interpreter: Arc<dyn Interpreter>) -> Self {
        Self {
            interpreter,
            booted_at: Instant::now(),
        }
    }

    /// Whether both handles point at the same interpreter instance
    #[inline]
    #[must_use]
    pub fn same_runtime(&self, other: &RuntimeHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.interpreter).cast::<()>(),
            Arc::as_ptr(&other.interpreter).cast::<()>(),
        )
    }

    /// Fingerprint of the loaded runtime image
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.interpreter.fingerprint()
    }

    /// When the runtime finished booting
    #[inline]
    #[must_use]
    pub fn booted_at(&self) -> Instant {
        self.booted_at
    }

    pub(crate) fn interpreter(&self) -> &Arc<dyn Interpreter> {
        &self.interpreter
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("fingerprint", &self.fingerprint())
            .field("booted_at", &self.booted_at)
            .finish()
    }
}

struct ManagerInner {
    provider: Arc<dyn RuntimeProvider>,
    handle: RwLock<Option<RuntimeHandle>>,
    boot: Mutex<Option<BootFuture>>,
    ready: watch::Sender<bool>,
    attempts: AtomicU64,
}

impl ManagerInner {
    async fn boot(inner: Arc<Self>) -> Result<RuntimeHandle, RuntimeInitError> {
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = inner.provider.describe();
        info!(attempt, provider = %provider, "booting embedded runtime");

        let started = Instant::now();
        let result = inner.provider.boot().await.map(RuntimeHandle::new);

        match &result {
            Ok(handle) => {
                *inner.handle.write() = Some(handle.clone());
                inner.ready.send_replace(true);
                info!(
                    attempt,
                    fingerprint = %handle.fingerprint(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embedded runtime ready"
                );
            }
            Err(e) => {
                warn!(attempt, error = %e, "runtime boot failed; next call will retry");
            }
        }

        inner.boot.lock().take();
        result
    }
}

/// Owner of the session's embedded runtime
///
/// Cheap to clone; clones share the same runtime.
#[derive(Clone)]
pub struct RuntimeManager {
    inner: Arc<ManagerInner>,
}

impl RuntimeManager {
    /// Create a manager that boots through `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn RuntimeProvider>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                provider,
                handle: RwLock::new(None),
                boot: Mutex::new(None),
                ready,
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Return the runtime, booting it if needed
    ///
    /// Concurrent callers share a single boot and resolve to the same handle.
    ///
    /// # Errors
    /// `RuntimeInitError` when the boot shared by this call fails. The
    /// failure is not remembered.
    pub async fn ensure_runtime(&self) -> Result<RuntimeHandle, RuntimeInitError> {
        if let Some(handle) = self.handle() {
            return Ok(handle);
        }

        let boot = {
            let mut slot = self.inner.boot.lock();
            if let Some(handle) = self.handle() {
                return Ok(handle);
            }
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = ManagerInner::boot(Arc::clone(&self.inner))
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        boot.await
    }

    /// Current handle without booting
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<RuntimeHandle> {
        self.inner.handle.read().clone()
    }

    /// Whether the runtime is booted
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Observe readiness changes
    #[must_use]
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.inner.ready.subscribe()
    }

    /// Wait until some caller has booted the runtime
    ///
    /// Does not start a boot by itself.
    pub async fn ready(&self) -> RuntimeHandle {
        let mut rx = self.subscribe_ready();
        loop {
            if let Some(handle) = self.handle() {
                return handle;
            }
            // Sender lives in `inner`, which `self` keeps alive.
            let _ = rx.changed().await;
        }
    }

    /// Number of boots started so far
    #[inline]
    #[must_use]
    pub fn boot_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Whether a boot is currently running
    #[inline]
    #[must_use]
    pub fn is_booting(&self) -> bool {
        self.inner.boot.lock().is_some()
    }
}

impl fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("provider", &self.inner.provider.describe())
            .field("ready", &self.is_ready())
            .field("boot_attempts", &self.boot_attempts())
            .finish()
    }
}
