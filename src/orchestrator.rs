//! The conversion state machine.
//!
//! ```text
//!  ConversionRequest
//!   │
//!   ├─ 1. Validate     resolve the FormatPair (fails fast, no gate slot)
//!   ├─ 2. Gate         Conversion pool, sub-lock keyed by output path
//!   ├─ 3. Scratch      TempDir "req-*" under the temp root
//!   ├─ 4. Preprocess   DOCX sources only; failure degrades to the original
//!   ├─ 5. Engines      walk pair.engines() until one succeeds
//!   └─ 6. Publish      move the staged artifact to the requested path
//! ```
//!
//! Every engine writes into its own directory inside the request's scratch
//! dir, and only the orchestrator touches the requested output path, once,
//! after an engine has succeeded. The gate slot and the scratch directory are
//! both scoped values, so they are released on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::ConverterConfig;
use crate::engine::{self, Deadline, EngineJob, EngineSet, EngineStatus};
use crate::error::ConvertError;
use crate::format::{DocumentFormat, EngineId, FormatPair};
use crate::gate::{GateStats, ResourceGate, ResourceKind};
use crate::output::{ConversionResult, EngineAttempt, ErrorInfo, PreprocessReport};
use crate::preprocess::PreprocessingEngine;
use crate::request::ConversionRequest;
use crate::telemetry::{self, NoopObserver, ObserverHandle, TelemetryEvent};

/// Converts documents. Cheap to clone; clones share the gate and engines.
#[derive(Clone)]
pub struct Converter {
    config: Arc<ConverterConfig>,
    gate: ResourceGate,
    engines: EngineSet,
    preprocessor: PreprocessingEngine,
    observer: ObserverHandle,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("engines", &self.engines)
            .finish()
    }
}

impl Converter {
    /// A converter using the real engines described by `config`.
    pub fn new(config: ConverterConfig) -> Result<Self, ConvertError> {
        let engines = EngineSet::from_config(&config);
        Self::with_engines(config, engines)
    }

    /// A converter with an explicit engine set.
    pub fn with_engines(config: ConverterConfig, engines: EngineSet) -> Result<Self, ConvertError> {
        let gate = ResourceGate::new(config.max_conversions, config.max_file_access)?;
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        Ok(Self {
            preprocessor: PreprocessingEngine::new(config.style_flattening),
            config: Arc::new(config),
            gate,
            engines,
            observer,
        })
    }

    /// Share `gate` with other converters instead of owning one.
    pub fn with_gate(mut self, gate: ResourceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    pub fn gate_stats(&self) -> GateStats {
        self.gate.stats()
    }

    /// Resolution status of every engine.
    pub fn engine_report(&self) -> Vec<EngineStatus> {
        self.engines.report()
    }

    /// Run one conversion. Never panics on bad input and never returns
    /// early without a result; failures are reported inside the result.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        let started = Instant::now();
        let (pair, result) = match request.validate() {
            Ok(pair) => {
                self.observer.on_conversion_start(pair);
                (Some(pair), self.run(request, pair, started).await)
            }
            Err(e) => {
                warn!(error = %e, "request rejected");
                (None, ConversionResult::failed(request.target(), &e, elapsed_ms(started)))
            }
        };

        self.observer.on_conversion_complete(&TelemetryEvent {
            operation: telemetry::operation_name(pair),
            duration_ms: result.duration_ms,
            success: result.success,
            error: result.error.clone(),
        });
        result
    }

    async fn run(&self, request: &ConversionRequest, pair: FormatPair, started: Instant) -> ConversionResult {
        let target = request.target();
        let deadline = request
            .options()
            .timeout_secs
            .map(|secs| Deadline::after(Duration::from_secs(secs)));
        let fail = |e: ConvertError| ConversionResult::failed(target, &e, elapsed_ms(started));

        // ── Gate ─────────────────────────────────────────────────────────
        let gate_timeout = match deadline {
            Some(d) => d.remaining().min(self.config.gate_timeout()),
            None => self.config.gate_timeout(),
        };
        let key = request.output().to_string_lossy();
        let _slot = match self
            .gate
            .acquire(ResourceKind::Conversion, Some(key.as_ref()), Some(1), Some(gate_timeout))
            .await
        {
            Ok(slot) => slot,
            Err(e) => return fail(e.into()),
        };

        // ── Scratch ──────────────────────────────────────────────────────
        let scratch = match self.scratch_dir().await {
            Ok(dir) => dir,
            Err(e) => return fail(e),
        };
        debug!(%pair, scratch = %scratch.path().display(), "conversion started");

        // ── Preprocess ───────────────────────────────────────────────────
        let (input, preprocessing) = self.prepare_input(request, pair, scratch.path(), deadline).await;
        let preprocessed = preprocessing.as_ref().is_some_and(|p| p.applied);

        // ── Engines ──────────────────────────────────────────────────────
        let mut attempts = Vec::new();
        let mut last_err = None;
        for &engine in pair.engines() {
            if let Some(d) = deadline.filter(|d| d.is_expired()) {
                if last_err.is_none() {
                    last_err = Some(ConvertError::EngineTimeout {
                        engine: engine.to_string(),
                        secs: d.budget().as_secs(),
                    });
                }
                break;
            }

            let attempt_started = Instant::now();
            let outcome = self
                .attempt(engine, &input, request, pair, deadline, scratch.path())
                .await;
            let attempt = EngineAttempt {
                engine,
                success: outcome.is_ok(),
                duration_ms: elapsed_ms(attempt_started),
                error: outcome.as_ref().err().map(ErrorInfo::from),
            };
            self.observer.on_attempt(&attempt);
            attempts.push(attempt);

            match outcome {
                Ok(staged) => match publish(&staged, request.output()).await {
                    Ok(()) => {
                        let duration_ms = elapsed_ms(started);
                        info!(%pair, %engine, duration_ms, "conversion succeeded");
                        return ConversionResult {
                            success: true,
                            output: Some(request.output().to_path_buf()),
                            error: None,
                            duration_ms,
                            method: Some(engine),
                            fidelity: Some(estimate_fidelity(engine, pair, preprocessed)),
                            target,
                            attempts,
                            preprocessing,
                        };
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                },
                Err(e) => {
                    warn!(%pair, %engine, error = %e, "engine attempt failed");
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| ConvertError::Internal(format!("no engine configured for {pair}")));
        warn!(%pair, attempts = attempts.len(), error = %err, "conversion failed");
        ConversionResult {
            attempts,
            preprocessing,
            ..fail(err)
        }
    }

    async fn scratch_dir(&self) -> Result<TempDir, ConvertError> {
        let root = &self.config.temp_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| ConvertError::io(root, e))?;
        tempfile::Builder::new()
            .prefix("req-")
            .tempdir_in(root)
            .map_err(|e| ConvertError::io(root, e))
    }

    /// The file the engines should read, plus what preprocessing did.
    async fn prepare_input(
        &self,
        request: &ConversionRequest,
        pair: FormatPair,
        scratch: &Path,
        deadline: Option<Deadline>,
    ) -> (PathBuf, Option<PreprocessReport>) {
        let original = request.input().to_path_buf();
        let enabled = request.options().preprocess.unwrap_or(self.config.preprocess);
        if !pair.preprocessable() || !enabled {
            return (original, None);
        }

        let started = Instant::now();
        match self.preprocess(&original, scratch, deadline).await {
            Ok((path, counters)) => {
                debug!(fixes = %counters, "engines will read the preprocessed package");
                let report = PreprocessReport {
                    applied: true,
                    counters,
                    duration_ms: elapsed_ms(started),
                    degraded: None,
                };
                (path, Some(report))
            }
            Err(e) => {
                warn!(error = %e, "preprocessing failed; continuing with the original document");
                let report = PreprocessReport {
                    applied: false,
                    duration_ms: elapsed_ms(started),
                    degraded: Some(e.user_message()),
                    ..Default::default()
                };
                (original, Some(report))
            }
        }
    }

    async fn preprocess(
        &self,
        input: &Path,
        scratch: &Path,
        deadline: Option<Deadline>,
    ) -> Result<(PathBuf, crate::preprocess::FixCounters), ConvertError> {
        let _io = self
            .gate
            .acquire(ResourceKind::FileAccess, None, None, Some(self.config.gate_timeout()))
            .await?;

        let dir = scratch.join("preprocessed");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ConvertError::io(&dir, e))?;
        // Keep the stem: LibreOffice names its output after the input file.
        let output = dir.join(format!("{}.{}", engine::stem(input), DocumentFormat::Docx.extension()));

        let work = self.preprocessor.preprocess(input.to_path_buf(), output.clone());
        tokio::pin!(work);
        let finished = match deadline {
            Some(d) => match tokio::time::timeout_at(d.instant(), work.as_mut()).await {
                Ok(finished) => finished,
                Err(_) => {
                    // The blocking job cannot be cancelled. It must finish
                    // writing before the scratch dir can be removed.
                    if let Err(e) = work.await {
                        debug!(error = %e, "preprocessing finished after the deadline");
                    }
                    return Err(ConvertError::Preprocessing("deadline reached".into()));
                }
            },
            None => work.await,
        };
        let counters = finished.map_err(|e| ConvertError::Preprocessing(e.to_string()))?;
        Ok((output, counters))
    }

    /// One engine attempt. Returns the staged artifact inside `scratch`.
    async fn attempt(
        &self,
        engine: EngineId,
        input: &Path,
        request: &ConversionRequest,
        pair: FormatPair,
        deadline: Option<Deadline>,
        scratch: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let adapter = self.engines.get(engine).ok_or_else(|| ConvertError::EngineNotFound {
            engine: engine.to_string(),
            detail: "no adapter configured".into(),
        })?;

        let work_dir = scratch.join(engine.as_str());
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| ConvertError::io(&work_dir, e))?;

        let budget = self.config.engine_timeout(engine);
        let job = EngineJob {
            input: input.to_path_buf(),
            output: scratch.join(format!("{}.{}", engine.as_str(), pair.target().extension())),
            pair,
            quality: request.options().quality,
            deadline: match deadline {
                Some(d) => d.cap(budget),
                None => Deadline::after(budget),
            },
            scratch_dir: work_dir,
        };
        debug!(%engine, budget_s = job.deadline.budget().as_secs(), "engine attempt");
        adapter.convert(&job).await?;
        engine::verify_output(engine, &job.output).await?;
        Ok(job.output)
    }
}

/// Move the staged artifact to the requested path. On failure `output` holds
/// whatever it held before.
async fn publish(staged: &Path, output: &Path) -> Result<(), ConvertError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConvertError::io(parent, e))?;
    }
    engine::move_into_place(staged, output).await
}

/// Rough 0–1 estimate of how faithful the artifact is to the source.
pub fn estimate_fidelity(engine: EngineId, pair: FormatPair, preprocessed: bool) -> f32 {
    match engine {
        EngineId::LibreOffice if pair.source() == DocumentFormat::Pdf => 0.75,
        EngineId::LibreOffice if preprocessed => 0.95,
        EngineId::LibreOffice => 0.9,
        EngineId::Chromium if pair.source() == DocumentFormat::Docx => 0.7,
        EngineId::Chromium => 0.8,
        EngineId::Reconstruct => 0.6,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
