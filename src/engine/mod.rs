//! Conversion engines behind one async interface.
//!
//! ```text
//!            ┌───────────────┐
//!  EngineJob │ EngineAdapter │──▶ artifact at job.output
//!  ─────────▶│  libreoffice  │    (or ConvertError)
//!            │  chromium     │
//!            │  reconstruct  │
//!            └───────────────┘
//! ```
//!
//! Adapters never decide fallback order; [`crate::format::FormatPair::engines`]
//! does, and the orchestrator walks it. Each adapter resolves its own
//! executable (see `engine-locate`), works only inside `job.scratch_dir`, and
//! moves its result to `job.output` as the very last step, so a failed
//! attempt never leaves a half-written file at the requested path.

pub mod chromium;
pub mod libreoffice;
pub mod markup;
pub mod process;
pub mod reconstruct;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_locate::LocateOptions;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{ConverterConfig, QualityTier, MAX_TIMEOUT_SECS};
use crate::error::ConvertError;
use crate::format::{EngineId, FormatPair};

pub use chromium::ChromiumAdapter;
pub use libreoffice::LibreOfficeAdapter;
pub use reconstruct::ReconstructAdapter;

/// Everything an adapter needs for one attempt.
#[derive(Debug, Clone)]
pub struct EngineJob {
    /// File the engine reads. May be a preprocessed copy of the request input.
    pub input: PathBuf,
    /// Where the artifact must end up.
    pub output: PathBuf,
    pub pair: FormatPair,
    pub quality: QualityTier,
    pub deadline: Deadline,
    /// Private, existing directory for this attempt. Removed by the caller.
    pub scratch_dir: PathBuf,
}

/// One conversion engine.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn id(&self) -> EngineId;

    /// Produce `job.output` from `job.input` before `job.deadline`.
    async fn convert(&self, job: &EngineJob) -> Result<(), ConvertError>;

    /// Whether the engine could run right now. Diagnostics only.
    fn status(&self) -> EngineStatus {
        EngineStatus::in_process(self.id())
    }
}

/// Resolution result for one engine, as shown by `docconv --engines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub engine: EngineId,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// `bundled`, `config`, `environment`, `system` or `in-process`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EngineStatus {
    pub fn in_process(engine: EngineId) -> Self {
        Self {
            engine,
            available: true,
            path: None,
            source: Some("in-process".into()),
            detail: None,
        }
    }

    pub(crate) fn located(engine: EngineId, found: Result<engine_locate::Located, ConvertError>) -> Self {
        match found {
            Ok(loc) => Self {
                engine,
                available: true,
                path: Some(loc.path),
                source: Some(loc.source.to_string()),
                detail: None,
            },
            Err(e) => Self {
                engine,
                available: false,
                path: None,
                source: None,
                detail: Some(e.to_string()),
            },
        }
    }
}

// ── Deadline ─────────────────────────────────────────────────────────────────

/// A wall-clock limit shared by every suspension point of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Budgets past [`MAX_TIMEOUT_SECS`] are clamped to it.
    pub fn after(budget: Duration) -> Self {
        let budget = budget.min(Duration::from_secs(MAX_TIMEOUT_SECS));
        let now = Instant::now();
        Self {
            at: now.checked_add(budget).unwrap_or(now),
            budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The earlier of `self` and `now + budget`.
    pub fn cap(self, budget: Duration) -> Self {
        let other = Self::after(budget);
        if other.at < self.at {
            other
        } else {
            self
        }
    }

    /// Drive `fut` until it finishes or the deadline passes. On expiry the
    /// future is dropped, which kills any child process it owns.
    pub async fn run<T, F>(self, engine: EngineId, fut: F) -> Result<T, ConvertError>
    where
        F: Future<Output = Result<T, ConvertError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConvertError::EngineTimeout {
                engine: engine.to_string(),
                secs: self.budget.as_secs(),
            }),
        }
    }
}

// ── Engine set ───────────────────────────────────────────────────────────────

/// The adapters available to an orchestrator, keyed by engine.
#[derive(Clone, Default)]
pub struct EngineSet {
    adapters: BTreeMap<EngineId, Arc<dyn EngineAdapter>>,
}

impl std::fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.adapters.keys()).finish()
    }
}

impl EngineSet {
    /// No adapters. Useful with [`EngineSet::with`] in tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// The real engines, configured from `config`.
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new()
            .with(LibreOfficeAdapter::new(locate_options(config, config.soffice_path.clone())))
            .with(ChromiumAdapter::new(
                locate_options(config, config.chromium_path.clone()),
                config.page_layout,
            ))
            .with(ReconstructAdapter::new(config.pdfium_lib_path.clone()))
    }

    /// Add or replace the adapter for its engine.
    pub fn with(mut self, adapter: impl EngineAdapter + 'static) -> Self {
        self.insert(Arc::new(adapter));
        self
    }

    pub fn insert(&mut self, adapter: Arc<dyn EngineAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, engine: EngineId) -> Option<&Arc<dyn EngineAdapter>> {
        self.adapters.get(&engine)
    }

    /// Status of every known engine, configured or not.
    pub fn report(&self) -> Vec<EngineStatus> {
        EngineId::ALL
            .iter()
            .map(|&id| match self.get(id) {
                Some(adapter) => adapter.status(),
                None => EngineStatus {
                    engine: id,
                    available: false,
                    path: None,
                    source: None,
                    detail: Some("no adapter configured".into()),
                },
            })
            .collect()
    }
}

pub(crate) fn locate_options(config: &ConverterConfig, override_path: Option<PathBuf>) -> LocateOptions {
    LocateOptions {
        force_bundled: config.force_bundled,
        override_path,
        app_dir: config.app_dir.clone(),
        extra_roots: config.extra_allowed_roots.clone(),
    }
}

pub(crate) fn not_found(engine: EngineId, err: engine_locate::LocateError) -> ConvertError {
    ConvertError::EngineNotFound {
        engine: engine.to_string(),
        detail: err.to_string(),
    }
}

// ── Output handling ──────────────────────────────────────────────────────────

/// Check that `produced` exists and is non-empty.
pub(crate) async fn verify_output(engine: EngineId, produced: &Path) -> Result<u64, ConvertError> {
    match tokio::fs::metadata(produced).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(ConvertError::OutputMissing {
            engine: engine.to_string(),
            expected: produced.to_path_buf(),
        }),
    }
}

/// Move `produced` to `output`, replacing whatever is there. A rename
/// swaps the file in atomically; when it cannot cross filesystems the bytes
/// are copied to a temp file beside `output` and renamed from there. The
/// previous `output` is untouched unless the new file is fully in place.
pub(crate) async fn move_into_place(produced: &Path, output: &Path) -> Result<(), ConvertError> {
    if tokio::fs::rename(produced, output).await.is_ok() {
        return Ok(());
    }

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".docconv-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| ConvertError::io(parent, e))?;
    tokio::fs::copy(produced, staging.path())
        .await
        .map_err(|e| ConvertError::io(produced, e))?;
    staging
        .persist(output)
        .map_err(|e| ConvertError::io(output, e.error))?;
    debug!(output = %output.display(), "output copied across filesystems");

    if let Err(e) = tokio::fs::remove_file(produced).await {
        debug!(staged = %produced.display(), error = %e, "staged artifact left for scratch cleanup");
    }
    Ok(())
}

/// File stem of `path`, or `"document"` when it has none.
pub(crate) fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}
