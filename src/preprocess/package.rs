//! WordprocessingML package access.
//!
//! Reading opens the ZIP container once; writing walks the original entries
//! in order and either raw-copies them (compressed bytes and headers
//! untouched) or, for edited XML parts only, writes the new text. The part
//! manifest and every non-edited part therefore survive byte-for-byte.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::PreprocessError;

/// Refuse to inflate a single XML part beyond this.
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

const MAIN_DOCUMENT: &str = "word/document.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const THEME_PART: &str = "word/theme/theme1.xml";

/// XML parts the preprocessor rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Document,
    Styles,
    Numbering,
    Settings,
    Header,
    Footer,
    Footnotes,
    Endnotes,
}

impl PartKind {
    /// Classify a package entry name. `None` means "pass through untouched".
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            MAIN_DOCUMENT => Some(PartKind::Document),
            "word/styles.xml" => Some(PartKind::Styles),
            "word/numbering.xml" => Some(PartKind::Numbering),
            "word/settings.xml" => Some(PartKind::Settings),
            "word/footnotes.xml" => Some(PartKind::Footnotes),
            "word/endnotes.xml" => Some(PartKind::Endnotes),
            n if is_numbered(n, "word/header") => Some(PartKind::Header),
            n if is_numbered(n, "word/footer") => Some(PartKind::Footer),
            _ => None,
        }
    }
}

/// `word/header3.xml` style names (but not `word/_rels/header3.xml.rels`).
fn is_numbered(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(".xml"))
        .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
}

/// A targeted XML part and its text.
#[derive(Debug, Clone, PartialEq)]
pub struct PackagePart {
    pub name: String,
    pub kind: PartKind,
    pub xml: String,
}

pub struct DocxPackage {
    archive: ZipArchive<BufReader<File>>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self, PreprocessError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        for required in [CONTENT_TYPES, MAIN_DOCUMENT] {
            if archive.by_name(required).is_err() {
                return Err(PreprocessError::NotAPackage(format!("missing part '{required}'")));
            }
        }
        Ok(Self { archive })
    }

    /// Names of all entries, in archive order.
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    /// Read the text of any entry, if present.
    pub fn read_text(&mut self, name: &str) -> Result<Option<String>, PreprocessError> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.size() > MAX_PART_BYTES {
            return Err(PreprocessError::NotAPackage(format!(
                "part '{name}' inflates to {} bytes",
                entry.size()
            )));
        }
        let mut text = String::with_capacity(entry.size() as usize);
        entry.read_to_string(&mut text)?;
        if let Some(stripped) = text.strip_prefix('\u{feff}') {
            text = stripped.to_string();
        }
        Ok(Some(text))
    }

    /// All targeted parts, in archive order.
    pub fn target_parts(&mut self) -> Result<Vec<PackagePart>, PreprocessError> {
        let targets: Vec<(String, PartKind)> = self
            .entry_names()
            .into_iter()
            .filter_map(|name| PartKind::classify(&name).map(|kind| (name, kind)))
            .collect();
        let mut parts = Vec::with_capacity(targets.len());
        for (name, kind) in targets {
            if let Some(xml) = self.read_text(&name)? {
                parts.push(PackagePart { name, kind, xml });
            }
        }
        Ok(parts)
    }

    /// Write the package to `output`, replacing the parts named in `edits`.
    pub fn write_to(
        mut self,
        output: &Path,
        edits: &HashMap<String, String>,
    ) -> Result<(), PreprocessError> {
        let file = File::create(output)?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(i)?;
            match edits.get(entry.name()) {
                Some(xml) => {
                    let name = entry.name().to_string();
                    drop(entry);
                    writer.start_file(name, options)?;
                    writer.write_all(xml.as_bytes())?;
                }
                None => writer.raw_copy_file(entry)?,
            }
        }
        writer.finish()?.flush()?;
        Ok(())
    }
}
