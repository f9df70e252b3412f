//! End-to-end tests against the real engines.
//!
//! These start LibreOffice, Chromium and pdfium, so they are gated behind the
//! `E2E_ENABLED` environment variable and skip themselves when an engine
//! cannot be resolved on this machine.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Engines are found the usual way (`DOCCONV_SOFFICE_PATH`,
//! `DOCCONV_CHROMIUM_PATH`, `PDFIUM_LIB_PATH`, then system locations).

use edgequake_docconv::{
    ConversionOptions, ConversionRequest, Converter, ConverterConfig, EngineId, QualityTier,
};
use std::io::Write;
use std::path::{Path, PathBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

fn converter() -> Converter {
    let config = ConverterConfig::from_env().expect("valid DOCCONV_* environment");
    Converter::new(config).expect("converter")
}

/// Skip unless E2E_ENABLED is set and `engine` resolves here.
macro_rules! e2e_skip_unless_ready {
    ($converter:expr, $engine:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let status = $converter
            .engine_report()
            .into_iter()
            .find(|s| s.engine == $engine)
            .unwrap();
        if !status.available {
            println!("SKIP: {} unavailable: {:?}", $engine, status.detail);
            return;
        }
    }};
}

fn write_docx(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let opts = zip::write::SimpleFileOptions::default();
    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        ),
        (
            "word/document.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:color w:val="000000" w:themeColor="accent1"/></w:rPr><w:t>Quarterly report</w:t></w:r></w:p><w:p><w:r><w:t>Revenue grew in every region.</w:t></w:r></w:p></w:body></w:document>"#,
        ),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn assert_pdf(path: &Path, context: &str) {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("[{context}] cannot read output: {e}"));
    assert!(bytes.starts_with(b"%PDF-"), "[{context}] output is not a PDF");
    assert!(bytes.len() > 500, "[{context}] PDF suspiciously small: {} bytes", bytes.len());
}

// ── LibreOffice ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_docx_to_pdf_libreoffice() {
    let converter = converter();
    e2e_skip_unless_ready!(converter, EngineId::LibreOffice);

    let tmp = tempfile::tempdir().unwrap();
    let input = write_docx(tmp.path(), "report.docx");
    let output = output_dir().join("report.pdf");
    let request = ConversionRequest::from_paths(&input, &output).unwrap();

    let result = converter.convert(&request).await;
    println!("{}", serde_json::to_string_pretty(&result).unwrap());
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.method, Some(EngineId::LibreOffice));
    assert!(result.preprocessing.as_ref().unwrap().applied);
    assert_pdf(&output, "docx→pdf");
}

#[tokio::test]
async fn test_quality_tiers_all_produce_pdfs() {
    let converter = converter();
    e2e_skip_unless_ready!(converter, EngineId::LibreOffice);

    let tmp = tempfile::tempdir().unwrap();
    let input = write_docx(tmp.path(), "tiers.docx");
    for quality in [QualityTier::Draft, QualityTier::Standard, QualityTier::High] {
        let output = output_dir().join(format!("tiers-{quality:?}.pdf").to_lowercase());
        let request = ConversionRequest::from_paths(&input, &output)
            .unwrap()
            .with_options(ConversionOptions {
                quality,
                ..Default::default()
            });
        let result = converter.convert(&request).await;
        assert!(result.success, "{quality:?}: {:?}", result.error);
        assert_pdf(&output, &format!("{quality:?}"));
    }
}

// ── Chromium ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_markdown_to_pdf_chromium() {
    let converter = converter();
    e2e_skip_unless_ready!(converter, EngineId::Chromium);

    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("notes.md");
    std::fs::write(
        &input,
        "# Release notes\n\n- faster startup\n- fewer crashes\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
    )
    .unwrap();
    let output = output_dir().join("notes.pdf");
    let result = converter
        .convert(&ConversionRequest::from_paths(&input, &output).unwrap())
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.method, Some(EngineId::Chromium));
    assert_pdf(&output, "md→pdf");
}

// ── Reconstruction ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_round_trip_to_text() {
    let converter = converter();
    e2e_skip_unless_ready!(converter, EngineId::LibreOffice);
    e2e_skip_unless_ready!(converter, EngineId::Reconstruct);

    let tmp = tempfile::tempdir().unwrap();
    let docx = write_docx(tmp.path(), "roundtrip.docx");
    let pdf = tmp.path().join("roundtrip.pdf");
    assert!(converter.convert(&ConversionRequest::from_paths(&docx, &pdf).unwrap()).await.success);

    let txt = output_dir().join("roundtrip.txt");
    let result = converter
        .convert(&ConversionRequest::from_paths(&pdf, &txt).unwrap())
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.method, Some(EngineId::Reconstruct));
    let text = std::fs::read_to_string(&txt).unwrap();
    assert!(text.contains("Quarterly report"), "got: {text}");
    assert!(text.ends_with('\n'));
}
