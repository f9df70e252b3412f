//! Error types for the edgequake-docconv library.
//!
//! Three error types:
//!
//! * [`ConvertError`]: anything that stops an engine attempt or a whole
//!   request. Every variant maps to a stable [`ErrorKind`] so callers can
//!   branch on the classification without parsing messages.
//!
//! * [`crate::gate::GateError`]: the concurrency gate refused or timed out.
//!   Converts into [`ConvertError::GateTimeout`] / [`ConvertError::Validation`].
//!
//! * [`crate::preprocess::PreprocessError`]: OOXML rewriting failed. This one
//!   never reaches the caller: the orchestrator records it and falls back to
//!   the untouched input.
//!
//! Display strings are for logs. Anything that crosses the library boundary
//! inside a [`crate::output::ConversionResult`] goes through
//! [`ConvertError::user_message`], which never includes filesystem paths.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::GateError;

/// Stable error classification reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    EngineNotFound,
    EngineTimeout,
    EngineExecution,
    Preprocessing,
    ResourceGateTimeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::EngineNotFound => "engine_not_found",
            ErrorKind::EngineTimeout => "engine_timeout",
            ErrorKind::EngineExecution => "engine_execution",
            ErrorKind::Preprocessing => "preprocessing",
            ErrorKind::ResourceGateTimeout => "resource_gate_timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors produced while converting a document.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request or the configuration is malformed.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No engine chain exists for this (source, target) pair.
    #[error("Unsupported conversion: {source_format} → {target_format}")]
    UnsupportedConversion {
        source_format: String,
        target_format: String,
    },

    /// Input artifact does not exist.
    #[error("Input file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The engine executable could not be resolved (or every candidate was rejected).
    #[error("Engine '{engine}' not available: {detail}")]
    EngineNotFound { engine: String, detail: String },

    /// The engine did not finish before the request deadline.
    #[error("Engine '{engine}' timed out after {secs}s")]
    EngineTimeout { engine: String, secs: u64 },

    /// The engine ran but failed (non-zero exit, crash, render error).
    #[error("Engine '{engine}' failed: {detail}")]
    EngineExecution { engine: String, detail: String },

    /// The engine reported success but produced nothing usable.
    #[error("Engine '{engine}' produced no output (expected '{expected}')")]
    OutputMissing { engine: String, expected: PathBuf },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Preprocessing failed. Recovered locally by the orchestrator.
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    /// Waited too long for a concurrency slot.
    #[error("Timed out after {waited_ms}ms waiting for a '{resource}' slot")]
    GateTimeout { resource: String, waited_ms: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    /// The stable classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Validation(_)
            | ConvertError::UnsupportedConversion { .. }
            | ConvertError::InputNotFound { .. } => ErrorKind::Validation,
            ConvertError::EngineNotFound { .. } => ErrorKind::EngineNotFound,
            ConvertError::EngineTimeout { .. } => ErrorKind::EngineTimeout,
            ConvertError::EngineExecution { .. } | ConvertError::OutputMissing { .. } => {
                ErrorKind::EngineExecution
            }
            ConvertError::Preprocessing(_) => ErrorKind::Preprocessing,
            ConvertError::GateTimeout { .. } => ErrorKind::ResourceGateTimeout,
            ConvertError::Io { .. } | ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable message safe to hand to end users: no paths, no
    /// engine stderr.
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::Validation(msg) => format!("Invalid request: {msg}"),
            ConvertError::UnsupportedConversion {
                source_format,
                target_format,
            } => format!("Conversion from {source_format} to {target_format} is not supported"),
            ConvertError::InputNotFound { .. } => "The input file could not be found".into(),
            ConvertError::EngineNotFound { engine, .. } => {
                format!("The {engine} conversion engine is not available")
            }
            ConvertError::EngineTimeout { engine, secs } => {
                format!("The {engine} conversion engine did not finish within {secs}s")
            }
            ConvertError::EngineExecution { engine, .. } | ConvertError::OutputMissing { engine, .. } => {
                format!("The {engine} conversion engine failed to convert the document")
            }
            ConvertError::Preprocessing(_) => "Document preprocessing failed".into(),
            ConvertError::GateTimeout { .. } => {
                "The server is busy; no conversion slot became free in time".into()
            }
            ConvertError::Io { .. } | ConvertError::Internal(_) => {
                "An internal error occurred during conversion".into()
            }
        }
    }
}

impl From<GateError> for ConvertError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Timeout { resource, waited_ms } => {
                ConvertError::GateTimeout { resource, waited_ms }
            }
            other @ GateError::InvalidConcurrency { .. } => ConvertError::Validation(other.to_string()),
            other @ GateError::Closed { .. } => ConvertError::Internal(other.to_string()),
        }
    }
}
