//! Supported formats and the `(source, target) → engine chain` table.
//!
//! Every supported ordered pair is one [`FormatPair`] variant. The fallback
//! order lives in [`FormatPair::engines`] and is the only place engine order
//! is decided; the orchestrator just walks it.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Docx,
    Doc,
    Odt,
    Rtf,
    Xlsx,
    Xls,
    Ods,
    Csv,
    Pptx,
    Ppt,
    Odp,
    Pdf,
    Html,
    Markdown,
    Txt,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 15] = [
        DocumentFormat::Docx,
        DocumentFormat::Doc,
        DocumentFormat::Odt,
        DocumentFormat::Rtf,
        DocumentFormat::Xlsx,
        DocumentFormat::Xls,
        DocumentFormat::Ods,
        DocumentFormat::Csv,
        DocumentFormat::Pptx,
        DocumentFormat::Ppt,
        DocumentFormat::Odp,
        DocumentFormat::Pdf,
        DocumentFormat::Html,
        DocumentFormat::Markdown,
        DocumentFormat::Txt,
    ];

    /// Canonical file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Docx => "docx",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Odt => "odt",
            DocumentFormat::Rtf => "rtf",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Ods => "ods",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Ppt => "ppt",
            DocumentFormat::Odp => "odp",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Html => "html",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Txt => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentFormat::Doc => "application/msword",
            DocumentFormat::Odt => "application/vnd.oasis.opendocument.text",
            DocumentFormat::Rtf => "application/rtf",
            DocumentFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            DocumentFormat::Xls => "application/vnd.ms-excel",
            DocumentFormat::Ods => "application/vnd.oasis.opendocument.spreadsheet",
            DocumentFormat::Csv => "text/csv",
            DocumentFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocumentFormat::Ppt => "application/vnd.ms-powerpoint",
            DocumentFormat::Odp => "application/vnd.oasis.opendocument.presentation",
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Html => "text/html",
            DocumentFormat::Markdown => "text/markdown",
            DocumentFormat::Txt => "text/plain",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "htm" => Some(DocumentFormat::Html),
            "markdown" => Some(DocumentFormat::Markdown),
            "text" => Some(DocumentFormat::Txt),
            other => Self::ALL.iter().copied().find(|f| f.extension() == other),
        }
    }

    /// Detect from the file extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| ConvertError::Validation(format!("unknown format '{s}'")))
    }
}

/// The conversion engines an attempt can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineId {
    /// LibreOffice in headless mode.
    LibreOffice,
    /// Headless Chromium printing styled HTML.
    Chromium,
    /// In-process PDF text extraction + structure reconstruction.
    Reconstruct,
}

impl EngineId {
    pub const ALL: [EngineId; 3] = [EngineId::LibreOffice, EngineId::Chromium, EngineId::Reconstruct];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::LibreOffice => "libreoffice",
            EngineId::Chromium => "chromium",
            EngineId::Reconstruct => "reconstruct",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supported ordered `(source, target)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatPair {
    // ── → PDF ─────────────────────────────────────────────────────────────
    DocxToPdf,
    DocToPdf,
    OdtToPdf,
    RtfToPdf,
    XlsxToPdf,
    XlsToPdf,
    OdsToPdf,
    CsvToPdf,
    PptxToPdf,
    PptToPdf,
    OdpToPdf,
    HtmlToPdf,
    MarkdownToPdf,
    TxtToPdf,
    // ── PDF → ─────────────────────────────────────────────────────────────
    PdfToDocx,
    PdfToTxt,
    // ── Office ↔ office ───────────────────────────────────────────────────
    DocToDocx,
    OdtToDocx,
    RtfToDocx,
    DocxToOdt,
    DocxToHtml,
    XlsToXlsx,
    XlsxToCsv,
    CsvToXlsx,
    PptToPptx,
}

impl FormatPair {
    pub const ALL: [FormatPair; 25] = [
        FormatPair::DocxToPdf,
        FormatPair::DocToPdf,
        FormatPair::OdtToPdf,
        FormatPair::RtfToPdf,
        FormatPair::XlsxToPdf,
        FormatPair::XlsToPdf,
        FormatPair::OdsToPdf,
        FormatPair::CsvToPdf,
        FormatPair::PptxToPdf,
        FormatPair::PptToPdf,
        FormatPair::OdpToPdf,
        FormatPair::HtmlToPdf,
        FormatPair::MarkdownToPdf,
        FormatPair::TxtToPdf,
        FormatPair::PdfToDocx,
        FormatPair::PdfToTxt,
        FormatPair::DocToDocx,
        FormatPair::OdtToDocx,
        FormatPair::RtfToDocx,
        FormatPair::DocxToOdt,
        FormatPair::DocxToHtml,
        FormatPair::XlsToXlsx,
        FormatPair::XlsxToCsv,
        FormatPair::CsvToXlsx,
        FormatPair::PptToPptx,
    ];

    /// Look up the pair for `(source, target)`.
    pub fn resolve(source: DocumentFormat, target: DocumentFormat) -> Result<Self, ConvertError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.formats() == (source, target))
            .ok_or_else(|| ConvertError::UnsupportedConversion {
                source_format: source.to_string(),
                target_format: target.to_string(),
            })
    }

    pub fn formats(&self) -> (DocumentFormat, DocumentFormat) {
        use DocumentFormat as F;
        match self {
            FormatPair::DocxToPdf => (F::Docx, F::Pdf),
            FormatPair::DocToPdf => (F::Doc, F::Pdf),
            FormatPair::OdtToPdf => (F::Odt, F::Pdf),
            FormatPair::RtfToPdf => (F::Rtf, F::Pdf),
            FormatPair::XlsxToPdf => (F::Xlsx, F::Pdf),
            FormatPair::XlsToPdf => (F::Xls, F::Pdf),
            FormatPair::OdsToPdf => (F::Ods, F::Pdf),
            FormatPair::CsvToPdf => (F::Csv, F::Pdf),
            FormatPair::PptxToPdf => (F::Pptx, F::Pdf),
            FormatPair::PptToPdf => (F::Ppt, F::Pdf),
            FormatPair::OdpToPdf => (F::Odp, F::Pdf),
            FormatPair::HtmlToPdf => (F::Html, F::Pdf),
            FormatPair::MarkdownToPdf => (F::Markdown, F::Pdf),
            FormatPair::TxtToPdf => (F::Txt, F::Pdf),
            FormatPair::PdfToDocx => (F::Pdf, F::Docx),
            FormatPair::PdfToTxt => (F::Pdf, F::Txt),
            FormatPair::DocToDocx => (F::Doc, F::Docx),
            FormatPair::OdtToDocx => (F::Odt, F::Docx),
            FormatPair::RtfToDocx => (F::Rtf, F::Docx),
            FormatPair::DocxToOdt => (F::Docx, F::Odt),
            FormatPair::DocxToHtml => (F::Docx, F::Html),
            FormatPair::XlsToXlsx => (F::Xls, F::Xlsx),
            FormatPair::XlsxToCsv => (F::Xlsx, F::Csv),
            FormatPair::CsvToXlsx => (F::Csv, F::Xlsx),
            FormatPair::PptToPptx => (F::Ppt, F::Pptx),
        }
    }

    pub fn source(&self) -> DocumentFormat {
        self.formats().0
    }

    pub fn target(&self) -> DocumentFormat {
        self.formats().1
    }

    /// Engines to try, in order. The first success ends the chain.
    pub fn engines(&self) -> &'static [EngineId] {
        use EngineId::*;
        match self {
            FormatPair::DocxToPdf => &[LibreOffice, Chromium],
            FormatPair::HtmlToPdf | FormatPair::TxtToPdf => &[Chromium, LibreOffice],
            FormatPair::MarkdownToPdf => &[Chromium],
            FormatPair::PdfToDocx => &[LibreOffice, Reconstruct],
            FormatPair::PdfToTxt => &[Reconstruct],
            _ => &[LibreOffice],
        }
    }

    /// Whether the OOXML preprocessor applies to the source.
    pub fn preprocessable(&self) -> bool {
        self.source() == DocumentFormat::Docx
    }
}

impl fmt::Display for FormatPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (s, t) = self.formats();
        write!(f, "{s}→{t}")
    }
}
