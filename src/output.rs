//! Result types returned by the converter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConvertError, ErrorKind};
use crate::format::{DocumentFormat, EngineId};
use crate::preprocess::FixCounters;

/// Caller-facing error: stable kind plus a path-free message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ConvertError> for ErrorInfo {
    fn from(e: &ConvertError) -> Self {
        Self {
            kind: e.kind(),
            message: e.user_message(),
        }
    }
}

/// One step of the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineAttempt {
    pub engine: EngineId,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// What preprocessing did for this request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessReport {
    /// `true` when the engine received the rewritten package.
    pub applied: bool,
    pub counters: FixCounters,
    pub duration_ms: u64,
    /// Set when preprocessing failed and the original input was used instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Outcome of one [`crate::ConversionRequest`]. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    /// Present iff `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Present iff `!success`. On chain exhaustion this is the last engine's error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub duration_ms: u64,
    /// Engine that produced the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<EngineId>,
    /// Rough 0–1 fidelity estimate for the produced artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<f32>,
    pub target: DocumentFormat,
    pub attempts: Vec<EngineAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<PreprocessReport>,
}

impl ConversionResult {
    pub(crate) fn failed(target: DocumentFormat, error: &ConvertError, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
            method: None,
            fidelity: None,
            target,
            attempts: Vec::new(),
            preprocessing: None,
        }
    }

    /// MIME type of the output artifact, when there is one.
    pub fn content_type(&self) -> Option<&'static str> {
        self.success.then(|| self.target.mime_type())
    }

    /// Errors of every failed attempt, in order.
    pub fn attempt_errors(&self) -> impl Iterator<Item = (EngineId, &ErrorInfo)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (a.engine, e)))
    }

    /// Convert into a `Result` for callers that only care about the artifact.
    pub fn into_result(self) -> Result<PathBuf, ErrorInfo> {
        match (self.output, self.error) {
            (Some(path), _) if self.success => Ok(path),
            (_, Some(err)) => Err(err),
            _ => Err(ErrorInfo {
                kind: ErrorKind::Internal,
                message: "conversion produced neither output nor error".into(),
            }),
        }
    }
}
