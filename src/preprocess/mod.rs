//! OOXML fidelity preprocessing.
//!
//! Rewrites the XML parts of a `.docx` package so the office engine renders
//! it the way the authoring application did:
//!
//! ```text
//!  part XML ─▶ parse ─▶ 1 fonts ─▶ 2 colors ─▶ 3 tables ─▶ 4 spacing
//!                        ─▶ 5 effects ─▶ 6 styles (styles part only)
//!                        ─▶ serialize ─▶ 7 write back changed parts
//! ```
//!
//! In the styles part, phase 6 runs first: inherited properties have to be
//! copied down the `basedOn` chain before phase 4 fills in spacing defaults,
//! or the defaults would shadow what a style inherits.
//!
//! Every phase is idempotent: running the engine over its own output makes
//! no further changes and reports empty [`FixCounters`]. A failure in any
//! phase fails the whole run; the caller is expected to fall back to the
//! untouched input.

pub mod colors;
pub mod counters;
pub mod effects;
pub mod fonts;
pub mod package;
pub mod spacing;
pub mod styles;
pub mod tables;
pub mod xml;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::StyleFlattening;

pub use counters::{FixCategory, FixCounters};
pub use fonts::ThemeFonts;
pub use package::{DocxPackage, PackagePart, PartKind};
use xml::{Document, XmlError};

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("package I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid package container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("not a WordprocessingML package: {0}")]
    NotAPackage(String),

    #[error("part '{part}' is not well-formed: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("preprocessing task failed: {0}")]
    Task(String),
}

/// Runs the rewrite phases over a package.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessingEngine {
    flattening: StyleFlattening,
}

impl PreprocessingEngine {
    pub fn new(flattening: StyleFlattening) -> Self {
        Self { flattening }
    }

    /// Run every phase over one part. Returns the new XML, or `None` when the
    /// part came out unchanged.
    pub fn rewrite_part(
        &self,
        kind: PartKind,
        xml: &str,
        theme: &ThemeFonts,
        counters: &mut FixCounters,
    ) -> Result<Option<String>, XmlError> {
        let mut doc = Document::parse(xml)?;
        let Some(root) = doc.root_mut() else {
            return Ok(None);
        };

        if kind == PartKind::Styles {
            styles::apply(root, self.flattening, counters);
        }
        fonts::apply(kind, root, theme, counters);
        colors::apply(root, counters);
        tables::apply(root, counters);
        spacing::apply(kind, root, counters);
        effects::apply(root, counters);

        let out = doc.to_xml();
        Ok((out != xml).then_some(out))
    }

    /// Preprocess `input` into a new package at `output`. Blocking.
    pub fn preprocess_file(&self, input: &Path, output: &Path) -> Result<FixCounters, PreprocessError> {
        let started = Instant::now();
        let mut pkg = DocxPackage::open(input)?;

        let theme = match pkg.read_text(package::THEME_PART)? {
            Some(text) => Document::parse(&text)
                .map_err(|source| PreprocessError::Xml {
                    part: package::THEME_PART.into(),
                    source,
                })?
                .root()
                .map(ThemeFonts::from_theme)
                .unwrap_or_default(),
            None => ThemeFonts::default(),
        };

        let mut counters = FixCounters::default();
        let mut edits = HashMap::new();
        for part in pkg.target_parts()? {
            let mut part_counters = FixCounters::default();
            let rewritten = self
                .rewrite_part(part.kind, &part.xml, &theme, &mut part_counters)
                .map_err(|source| PreprocessError::Xml {
                    part: part.name.clone(),
                    source,
                })?;
            debug!(part = %part.name, fixes = %part_counters, "part preprocessed");
            counters.merge(&part_counters);
            if let Some(xml) = rewritten {
                edits.insert(part.name, xml);
            }
        }

        pkg.write_to(output, &edits)?;
        info!(
            parts_rewritten = edits.len(),
            total_fixes = counters.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preprocessing complete"
        );
        Ok(counters)
    }

    /// Async wrapper: zip and XML work runs on the blocking pool.
    pub async fn preprocess(&self, input: PathBuf, output: PathBuf) -> Result<FixCounters, PreprocessError> {
        let engine = *self;
        tokio::task::spawn_blocking(move || engine.preprocess_file(&input, &output))
            .await
            .map_err(|e| PreprocessError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::package::tests::write_package;
    use super::*;
    use std::io::Read;

    const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;

    const DOCUMENT: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:keepNext/><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr><w:r><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:color w:val="4472C4" w:themeColor="accent1"/><w:shadow/><w:sz w:val="22"/></w:rPr><w:t>Hello</w:t></w:r></w:p><w:tbl><w:tblPr><w:tblW w:w="5000" w:type="pct"/></w:tblPr><w:tr><w:tc><w:tcPr><w:tcW w:w="0" w:type="auto"/></w:tcPr><w:p/></w:tc></w:tr></w:tbl><w:sectPr><w:type w:val="evenPage"/></w:sectPr></w:body></w:document>"#;

    const STYLES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:asciiTheme="minorHAnsi" w:hAnsiTheme="minorHAnsi"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:styleId="Normal"><w:rPr><w:sz w:val="22"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Title"><w:basedOn w:val="Normal"/><w:next w:val="Normal"/></w:style></w:styles>"#;

    const IMAGE: &[u8] = &[0x89, b'P', b'N', b'G', 13, 10, 26, 10, 0, 0, 0, 13];

    fn sample(dir: &Path) -> PathBuf {
        let path = dir.join("sample.docx");
        write_package(
            &path,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("word/document.xml", DOCUMENT),
                ("word/styles.xml", STYLES),
                ("word/media/image1.png", IMAGE),
                ("docProps/core.xml", b"<cp:coreProperties/>".as_slice()),
            ],
        );
        path
    }

    fn read_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut buf = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn every_phase_reports_fixes() {
        let tmp = tempfile::tempdir().unwrap();
        let input = sample(tmp.path());
        let output = tmp.path().join("out.docx");
        let counters = PreprocessingEngine::default()
            .preprocess_file(&input, &output)
            .unwrap();

        for cat in [
            FixCategory::FontsNormalized,
            FixCategory::ThemeFontsStripped,
            FixCategory::ColorsConverted,
            FixCategory::TablesOptimized,
            FixCategory::SpacingNormalized,
            FixCategory::PaginationFixed,
            FixCategory::SectionsNormalized,
            FixCategory::EffectsStripped,
            FixCategory::StylesFlattened,
        ] {
            assert!(counters.get(cat) > 0, "no {cat} in {counters}");
        }

        let doc = String::from_utf8(read_entry(&output, "word/document.xml")).unwrap();
        assert!(doc.contains(r#"w:ascii="Carlito""#));
        assert!(doc.contains(r#"<w:tblW w:w="9360" w:type="dxa"/>"#));
        assert!(!doc.contains("themeColor"));
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
    }

    #[test]
    fn untouched_parts_are_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let input = sample(tmp.path());
        let output = tmp.path().join("out.docx");
        PreprocessingEngine::default()
            .preprocess_file(&input, &output)
            .unwrap();

        for name in ["[Content_Types].xml", "word/media/image1.png", "docProps/core.xml"] {
            assert_eq!(read_entry(&input, name), read_entry(&output, name), "{name}");
        }
        let names_in = DocxPackage::open(&input).unwrap().entry_names();
        let names_out = DocxPackage::open(&output).unwrap().entry_names();
        assert_eq!(names_in, names_out);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let input = sample(tmp.path());
        let once = tmp.path().join("once.docx");
        let twice = tmp.path().join("twice.docx");
        let engine = PreprocessingEngine::default();
        engine.preprocess_file(&input, &once).unwrap();
        let counters = engine.preprocess_file(&once, &twice).unwrap();
        assert!(counters.is_empty(), "second run reported {counters}");
        assert_eq!(
            read_entry(&once, "word/document.xml"),
            read_entry(&twice, "word/document.xml")
        );
    }

    #[test]
    fn malformed_part_fails_the_whole_run() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("bad.docx");
        write_package(
            &input,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("word/document.xml", b"<w:document><w:body></w:document>".as_slice()),
            ],
        );
        let err = PreprocessingEngine::default()
            .preprocess_file(&input, &tmp.path().join("out.docx"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Xml { ref part, .. } if part == "word/document.xml"));
    }

    #[test]
    fn unchanged_part_is_reported_as_none() {
        let mut counters = FixCounters::default();
        let out = PreprocessingEngine::default()
            .rewrite_part(
                PartKind::Settings,
                r#"<w:settings><w:zoom w:percent="100"/></w:settings>"#,
                &ThemeFonts::default(),
                &mut counters,
            )
            .unwrap();
        assert!(out.is_none());
        assert!(counters.is_empty());
    }

    #[test]
    fn derived_style_keeps_inherited_spacing() {
        let styles = concat!(
            r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            r#"<w:style w:type="paragraph" w:styleId="Normal"><w:pPr><w:spacing w:after="160" w:line="285" w:lineRule="auto"/></w:pPr></w:style>"#,
            r#"<w:style w:type="paragraph" w:styleId="Heading2"><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:before="40"/></w:pPr></w:style>"#,
            r#"</w:styles>"#
        );
        let mut counters = FixCounters::default();
        let out = PreprocessingEngine::default()
            .rewrite_part(PartKind::Styles, styles, &ThemeFonts::default(), &mut counters)
            .unwrap()
            .unwrap();

        let doc = Document::parse(&out).unwrap();
        let heading = doc
            .root()
            .unwrap()
            .elements()
            .find(|s| s.attr("w:styleId") == Some("Heading2"))
            .unwrap();
        let spacing = heading.child("w:pPr").unwrap().child("w:spacing").unwrap();
        assert_eq!(spacing.attr("w:before"), Some("40"));
        assert_eq!(spacing.attr("w:after"), Some("160"));
        // 285 * 264 / 240 = 313.5
        assert_eq!(spacing.attr("w:line"), Some("314"));
        assert_eq!(spacing.attr("w:lineRule"), Some("atLeast"));
        assert!(!heading.has_child("w:basedOn"));
        assert_eq!(counters.get(FixCategory::StylesFlattened), 1);
    }

    #[tokio::test]
    async fn async_wrapper_runs_on_blocking_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let input = sample(tmp.path());
        let output = tmp.path().join("async.docx");
        let counters = PreprocessingEngine::new(StyleFlattening::StripOnly)
            .preprocess(input, output.clone())
            .await
            .unwrap();
        assert!(counters.total() > 0);
        assert!(output.exists());
    }
}
