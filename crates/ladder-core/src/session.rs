//! Session: one learner's runtime, cache and grading coordinator
//!
//! The composition root. Everything below it is injected, so tests build a
//! session from a scripted runtime and an in-memory server.

use crate::config::{ConfigError, LadderConfig};
use crate::error::Result;
use ladder_client::{ChallengeApi, HttpChallengeApi};
use ladder_grading::{GradingCoordinator, GradingReport};
use ladder_model::{CertificateEligibility, CertificateRecord, HintResult, Level};
use ladder_progress::{progress_summary, ProgressSummary, ProgressionCache, ViewMemo};
use ladder_runtime::{RuntimeHandle, RuntimeManager, RuntimeProvider, Sandbox, WasiPythonProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Certificate state reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStatus {
    /// Whether the learner may claim a certificate
    pub eligibility: CertificateEligibility,
    /// Issued certificate, if any
    pub record: Option<CertificateRecord>,
}

/// Wired-up ladder for one learner
pub struct LadderSession {
    config: LadderConfig,
    api: Arc<dyn ChallengeApi>,
    runtime: RuntimeManager,
    cache: ProgressionCache,
    coordinator: GradingCoordinator,
    view: ViewMemo,
}

impl LadderSession {
    /// Build a session against the configured server and interpreter image
    ///
    /// # Errors
    /// `Config` when validation fails or no interpreter image is configured,
    /// `Client` when the HTTP client cannot be built.
    pub fn connect(config: LadderConfig) -> Result<Self> {
        config.validate()?;
        let python = config.runtime.python().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "runtime.module_path is not set (or set {})",
                crate::config::ENV_PYTHON_WASM
            ))
        })?;
        let api = Arc::new(HttpChallengeApi::new(config.api.clone())?);
        let provider = Arc::new(WasiPythonProvider::new(python));
        Ok(Self::from_parts(config, provider, api))
    }

    /// Build a session from injected parts
    #[must_use]
    pub fn from_parts(
        config: LadderConfig,
        provider: Arc<dyn RuntimeProvider>,
        api: Arc<dyn ChallengeApi>,
    ) -> Self {
        let runtime = RuntimeManager::new(provider);
        let sandbox = Sandbox::new(config.runtime.limits());
        let cache = ProgressionCache::with_options(Arc::clone(&api), config.cache.options());
        let coordinator = GradingCoordinator::new(
            runtime.clone(),
            sandbox,
            Arc::clone(&api),
            cache.clone(),
        );
        Self {
            config,
            api,
            runtime,
            cache,
            coordinator,
            view: ViewMemo::new(),
        }
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LadderConfig {
        &self.config
    }

    /// Progression cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ProgressionCache {
        &self.cache
    }

    /// Grading coordinator
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &GradingCoordinator {
        &self.coordinator
    }

    /// Runtime manager
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &RuntimeManager {
        &self.runtime
    }

    /// Start booting the runtime without waiting for it
    ///
    /// Failures are logged; the next `prepare` or `grade` retries.
    pub fn warm_up(&self) -> JoinHandle<()> {
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.ensure_runtime().await {
                warn!(error = %e, "runtime warm-up failed");
            }
        })
    }

    /// Boot the runtime, or wait for the boot in progress
    ///
    /// # Errors
    /// `Runtime` when the boot fails.
    pub async fn prepare(&self) -> Result<RuntimeHandle> {
        Ok(self.runtime.ensure_runtime().await?)
    }

    /// Level view over the current challenge list
    ///
    /// # Errors
    /// `Progress` when the list cannot be fetched.
    pub async fn levels(&self, force: bool) -> Result<Arc<Vec<Level>>> {
        let snapshot = self.cache.fetch_all(force).await?;
        Ok(self.view.derive(&snapshot))
    }

    /// Refetch the list when it is older than the freshness window
    ///
    /// # Errors
    /// `Progress` when the refetch fails.
    pub async fn refresh(&self) -> Result<Arc<Vec<Level>>> {
        let snapshot = self.cache.ensure_fresh(self.config.cache.freshness()).await?;
        Ok(self.view.derive(&snapshot))
    }

    /// Completion totals over the cached list
    ///
    /// # Errors
    /// `Progress` when the list cannot be fetched.
    pub async fn summary(&self) -> Result<ProgressSummary> {
        let snapshot = self.cache.fetch_all(false).await?;
        Ok(progress_summary(&snapshot))
    }

    /// Grade `code` for `slug` and submit a passing result
    ///
    /// # Errors
    /// `Runtime` when the runtime cannot boot, `Progress` when the challenge
    /// cannot be loaded, `Grading` when the coordinator refuses the run.
    pub async fn grade(&self, slug: &str, code: &str) -> Result<GradingReport> {
        self.prepare().await?;
        self.cache.fetch_all(false).await?;
        let challenge = self.cache.fetch_detail(slug, false).await?;
        let report = self.coordinator.run(&challenge, code).await?;
        info!(slug, phase = %report.phase, "graded");
        Ok(report)
    }

    /// Buy a hint for `slug`
    ///
    /// # Errors
    /// `Grading` wrapping the client error; check
    /// [`LadderError::user_message`](crate::LadderError::user_message) for
    /// insufficient funds.
    pub async fn purchase_hint(&self, slug: &str) -> Result<HintResult> {
        Ok(self.coordinator.purchase_hint(slug).await?)
    }

    /// Server-side certificate state
    ///
    /// # Errors
    /// `Client` when either request fails.
    pub async fn certificate(&self) -> Result<CertificateStatus> {
        let (eligibility, record) = tokio::try_join!(
            self.api.certificate_eligibility(),
            self.api.my_certificate()
        )?;
        Ok(CertificateStatus {
            eligibility,
            record,
        })
    }

    /// Forget cached progress, e.g. on sign-out
    pub fn sign_out(&self) {
        self.coordinator.abandon();
        self.cache.clear();
    }
}

impl std::fmt::Debug for LadderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LadderSession")
            .field("config", &self.config)
            .field("runtime", &self.runtime)
            .field("cache", &self.cache)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
