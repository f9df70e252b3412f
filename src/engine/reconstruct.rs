//! In-process PDF → DOCX/TXT via text extraction and structure heuristics.
//!
//! pdfium extracts the text layer page by page (form feed between pages),
//! [`crate::reconstruct`] cleans it and rebuilds headings, list items and
//! paragraphs, and the result is written as a fresh package or plain text.
//! Scanned PDFs without a text layer fail here with an execution error;
//! OCR is not attempted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use super::{EngineAdapter, EngineJob, EngineStatus};
use crate::error::ConvertError;
use crate::format::{DocumentFormat, EngineId};
use crate::reconstruct::{docx, PdfStructureReconstructor};

const ENGINE: EngineId = EngineId::Reconstruct;

/// Text layer of a PDF.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub title: Option<String>,
    pub pages: Vec<String>,
}

impl ExtractedText {
    /// All pages, separated by form feeds.
    pub fn joined(&self) -> String {
        self.pages.join("\u{000C}")
    }
}

pub struct ReconstructAdapter {
    pdfium_lib: Option<PathBuf>,
    reconstructor: PdfStructureReconstructor,
}

impl ReconstructAdapter {
    /// `pdfium_lib`: explicit library file; `None` binds the system library.
    pub fn new(pdfium_lib: Option<PathBuf>) -> Self {
        Self {
            pdfium_lib,
            reconstructor: PdfStructureReconstructor::new(),
        }
    }
}

#[async_trait]
impl EngineAdapter for ReconstructAdapter {
    fn id(&self) -> EngineId {
        ENGINE
    }

    async fn convert(&self, job: &EngineJob) -> Result<(), ConvertError> {
        let target = job.pair.target();
        if job.pair.source() != DocumentFormat::Pdf || !matches!(target, DocumentFormat::Docx | DocumentFormat::Txt) {
            return Err(ConvertError::EngineExecution {
                engine: ENGINE.to_string(),
                detail: format!("cannot convert {}", job.pair),
            });
        }

        let input = job.input.clone();
        let lib = self.pdfium_lib.clone();
        let extracted = job
            .deadline
            .run(ENGINE, async move {
                tokio::task::spawn_blocking(move || extract_text(&input, lib.as_deref()))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("extraction task failed: {e}")))?
            })
            .await?;

        let blocks = self.reconstructor.reconstruct_raw(&extracted.joined());
        if blocks.is_empty() {
            return Err(ConvertError::EngineExecution {
                engine: ENGINE.to_string(),
                detail: "the PDF has no extractable text layer".into(),
            });
        }
        debug!(pages = extracted.pages.len(), blocks = blocks.len(), "structure reconstructed");

        let produced = job
            .scratch_dir
            .join(format!("reconstructed.{}", target.extension()));
        match target {
            DocumentFormat::Docx => {
                let path = produced.clone();
                let title = extracted.title.clone();
                tokio::task::spawn_blocking(move || docx::write_docx(&blocks, title.as_deref(), &path))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("docx writer task failed: {e}")))?
                    .map_err(|e| ConvertError::EngineExecution {
                        engine: ENGINE.to_string(),
                        detail: format!("writing package failed: {e}"),
                    })?;
            }
            _ => tokio::fs::write(&produced, docx::render_text(&blocks))
                .await
                .map_err(|e| ConvertError::io(&produced, e))?,
        }

        let bytes = super::verify_output(ENGINE, &produced).await?;
        super::move_into_place(&produced, &job.output).await?;
        info!(pair = %job.pair, bytes, pages = extracted.pages.len(), "reconstruction complete");
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        match bind(self.pdfium_lib.as_deref()) {
            Ok(_) => EngineStatus {
                path: self.pdfium_lib.clone(),
                ..EngineStatus::in_process(ENGINE)
            },
            Err(e) => EngineStatus {
                engine: ENGINE,
                available: false,
                path: self.pdfium_lib.clone(),
                source: None,
                detail: Some(e.to_string()),
            },
        }
    }
}

fn bind(lib: Option<&Path>) -> Result<Pdfium, ConvertError> {
    let bindings = match lib {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    };
    bindings.map(Pdfium::new).map_err(|e| ConvertError::EngineNotFound {
        engine: ENGINE.to_string(),
        detail: format!("pdfium library unavailable: {e}"),
    })
}

/// Extract the text layer of every page. Blocking.
pub fn extract_text(path: &Path, lib: Option<&Path>) -> Result<ExtractedText, ConvertError> {
    let pdfium = bind(lib)?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ConvertError::EngineExecution {
            engine: ENGINE.to_string(),
            detail: format!("cannot open PDF: {e:?}"),
        })?;

    let title = document
        .metadata()
        .get(PdfDocumentMetadataTagType::Title)
        .map(|tag| tag.value().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| ConvertError::EngineExecution {
            engine: ENGINE.to_string(),
            detail: format!("text extraction failed on page {}: {e:?}", index + 1),
        })?;
        pages.push(text.all());
    }
    Ok(ExtractedText { title, pages })
}
