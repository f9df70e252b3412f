//! Inbound conversion requests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{QualityTier, MAX_TIMEOUT_SECS};
use crate::error::ConvertError;
use crate::format::{DocumentFormat, FormatPair};

/// Per-request knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub quality: QualityTier,
    /// Overall deadline for the request, in seconds. `None` → the
    /// per-engine defaults from the config apply to each attempt.
    pub timeout_secs: Option<u64>,
    /// `Some(false)` skips OOXML preprocessing; `None` follows the config.
    pub preprocess: Option<bool>,
}

/// One conversion to perform. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    input: PathBuf,
    source: DocumentFormat,
    target: DocumentFormat,
    output: PathBuf,
    options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        source: DocumentFormat,
        target: DocumentFormat,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            source,
            target,
            output: output.into(),
            options: ConversionOptions::default(),
        }
    }

    /// Build a request whose formats are taken from the file extensions.
    pub fn from_paths(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<Self, ConvertError> {
        let input = input.into();
        let output = output.into();
        let source = detect(&input)?;
        let target = detect(&output)?;
        Ok(Self::new(input, source, target, output))
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn source(&self) -> DocumentFormat {
        self.source
    }

    pub fn target(&self) -> DocumentFormat {
        self.target
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Check the request is well-formed and resolve its format pair.
    pub fn validate(&self) -> Result<FormatPair, ConvertError> {
        if self.input.as_os_str().is_empty() || self.output.as_os_str().is_empty() {
            return Err(ConvertError::Validation(
                "input and output paths are required".into(),
            ));
        }
        match self.options.timeout_secs {
            Some(0) => return Err(ConvertError::Validation("timeout must be ≥ 1s".into())),
            Some(secs) if secs > MAX_TIMEOUT_SECS => {
                return Err(ConvertError::Validation(format!(
                    "timeout must be ≤ {MAX_TIMEOUT_SECS}s, got {secs}s"
                )))
            }
            _ => {}
        }
        let pair = FormatPair::resolve(self.source, self.target)?;
        if !self.input.is_file() {
            return Err(ConvertError::InputNotFound {
                path: self.input.clone(),
            });
        }
        if self.input == self.output {
            return Err(ConvertError::Validation(
                "output path must differ from input path".into(),
            ));
        }
        Ok(pair)
    }
}

fn detect(path: &Path) -> Result<DocumentFormat, ConvertError> {
    DocumentFormat::from_path(path).ok_or_else(|| {
        ConvertError::Validation(format!(
            "cannot infer a supported format from extension of '{}'",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ))
    })
}
