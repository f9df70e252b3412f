//! # edgequake-docconv
//!
//! Convert office documents, web formats and PDFs by driving external
//! engines (LibreOffice, headless Chromium) with an in-process fallback for
//! PDF text reconstruction.
//!
//! ## Why this crate?
//!
//! Office engines get most documents right, but DOCX files produced by Word
//! often lean on fonts, theme colors and table layouts that LibreOffice
//! renders differently. Before a DOCX reaches the engine, this crate rewrites
//! its XML parts so the result looks like what Word would have printed. When
//! an engine is missing, crashes or runs out of time, the next engine in a
//! fixed per-format chain takes over.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Validate    (source, target) → FormatPair with its engine chain
//!  ├─ 2. Gate        bounded concurrency, per-output sub-lock
//!  ├─ 3. Preprocess  DOCX only: fonts, theme colors, tables, spacing, effects, styles
//!  ├─ 4. Engines     libreoffice → chromium → reconstruct (per pair)
//!  └─ 5. Result      output path, method, fidelity, attempts, fix counters
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docconv::{ConversionRequest, Converter, ConverterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConverterConfig::from_env()?)?;
//!     let request = ConversionRequest::from_paths("report.docx", "report.pdf")?;
//!     let result = converter.convert(&request).await;
//!     match result.method {
//!         Some(engine) => println!("converted by {engine}"),
//!         None => eprintln!("failed: {:?}", result.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod gate;
pub mod orchestrator;
pub mod output;
pub mod preprocess;
pub mod reconstruct;
pub mod request;
pub mod telemetry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchItem, BatchStream};
pub use config::{ConverterConfig, ConverterConfigBuilder, PageLayout, QualityTier, StyleFlattening};
pub use engine::{EngineAdapter, EngineJob, EngineSet, EngineStatus};
pub use error::{ConvertError, ErrorKind};
pub use format::{DocumentFormat, EngineId, FormatPair};
pub use gate::{GateError, GateStats, ResourceGate, ResourceKind, ResourceLock};
pub use orchestrator::Converter;
pub use output::{ConversionResult, EngineAttempt, ErrorInfo, PreprocessReport};
pub use preprocess::{FixCategory, FixCounters, PreprocessingEngine};
pub use reconstruct::{Block, BlockKind, PdfStructureReconstructor};
pub use request::{ConversionOptions, ConversionRequest};
pub use telemetry::{ConversionObserver, NoopObserver, ObserverHandle, TelemetryEvent, TracingObserver};
