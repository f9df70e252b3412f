//! Output builders for reconstructed blocks.
//!
//! [`write_docx`] produces the smallest WordprocessingML package Word and
//! LibreOffice open without complaint: content types, the two relationship
//! parts, a styles part defining `Title`, `Heading1`–`Heading6` and
//! `ListParagraph`, and the document body.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::escape::escape;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Block, BlockKind};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Heading sizes in half-points, `Heading1` first.
const HEADING_SIZES: [u32; 6] = [32, 28, 26, 24, 22, 22];

/// Write `blocks` as a `.docx` package at `path`. `title`, when given,
/// becomes a leading `Title` paragraph.
pub fn write_docx(blocks: &[Block], title: Option<&str>, path: &Path) -> ZipResult<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
        ("word/styles.xml", styles_xml()),
        ("word/document.xml", document_xml(blocks, title)),
    ] {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish()?.flush()?;
    Ok(())
}

/// Plain-text rendering: one block per paragraph, blank line between.
pub fn render_text(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&block.text);
        out.push('\n');
    }
    out
}

fn document_xml(blocks: &[Block], title: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        push_paragraph(&mut body, Some("Title"), title);
    }
    for block in blocks {
        match block.kind {
            BlockKind::Heading => {
                let level = block.level.unwrap_or(super::DEFAULT_HEADING_LEVEL).clamp(1, 6);
                push_paragraph(&mut body, Some(&format!("Heading{level}")), &block.text);
            }
            BlockKind::ListItem => push_paragraph(&mut body, Some("ListParagraph"), &block.text),
            BlockKind::Paragraph => push_paragraph(&mut body, None, &block.text),
        }
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<w:document xmlns:w="{ns}"><w:body>{body}"#,
            r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/>"#,
            r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/>"#,
            r#"</w:sectPr></w:body></w:document>"#
        ),
        ns = W_NS,
        body = body
    )
}

fn push_paragraph(out: &mut String, style: Option<&str>, text: &str) {
    out.push_str("<w:p>");
    if let Some(style) = style {
        out.push_str(&format!(r#"<w:pPr><w:pStyle w:val="{style}"/></w:pPr>"#));
    }
    let text = xml_safe(text);
    out.push_str(&format!(
        r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text.as_str())
    ));
}

/// Drop characters XML 1.0 cannot carry at all.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect()
}

fn styles_xml() -> String {
    let mut styles = String::new();
    styles.push_str(concat!(
        r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/>"#,
        r#"<w:pPr><w:spacing w:after="120" w:line="276" w:lineRule="auto"/></w:pPr>"#,
        r#"<w:rPr><w:rFonts w:ascii="Liberation Serif" w:hAnsi="Liberation Serif" w:eastAsia="Liberation Serif" w:cs="Liberation Serif"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:style>"#,
        r#"<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/>"#,
        r#"<w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="40"/><w:szCs w:val="40"/></w:rPr></w:style>"#,
        r#"<w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/><w:basedOn w:val="Normal"/><w:qFormat/>"#,
        r#"<w:pPr><w:ind w:left="720"/></w:pPr></w:style>"#,
    ));
    for (i, size) in HEADING_SIZES.iter().enumerate() {
        let level = i + 1;
        styles.push_str(&format!(
            concat!(
                r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/>"#,
                r#"<w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/>"#,
                r#"<w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{outline}"/></w:pPr>"#,
                r#"<w:rPr><w:b/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr></w:style>"#
            ),
            level = level,
            outline = i,
            size = size
        ));
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<w:styles xmlns:w="{ns}">{styles}</w:styles>"#
        ),
        ns = W_NS,
        styles = styles
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::xml::Document;
    use crate::preprocess::DocxPackage;

    fn sample() -> Vec<Block> {
        vec![
            Block::heading("INTRODUCTION", 1),
            Block::paragraph("Fish & chips <cost> \"less\"\u{0007}"),
            Block::list_item("• first"),
            Block::heading("Deep", 9),
        ]
    }

    #[test]
    fn package_opens_and_parses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.docx");
        write_docx(&sample(), Some("Annual report"), &path).unwrap();

        let mut pkg = DocxPackage::open(&path).unwrap();
        assert!(pkg.entry_names().contains(&"word/styles.xml".to_string()));

        let xml = pkg.read_text("word/document.xml").unwrap().unwrap();
        let doc = Document::parse(&xml).unwrap();
        let body = doc.root().unwrap().child("w:body").unwrap();
        let styles: Vec<Option<&str>> = body
            .elements()
            .filter(|e| e.is("w:p"))
            .map(|p| {
                p.child("w:pPr")
                    .and_then(|ppr| ppr.child("w:pStyle"))
                    .and_then(|s| s.attr("w:val"))
            })
            .collect();
        assert_eq!(
            styles,
            [
                Some("Title"),
                Some("Heading1"),
                None,
                Some("ListParagraph"),
                Some("Heading6")
            ]
        );
        assert!(xml.contains("Fish &amp; chips &lt;cost&gt;"));
        assert!(!xml.contains('\u{0007}'));

        let styles = pkg.read_text("word/styles.xml").unwrap().unwrap();
        assert!(Document::parse(&styles).is_ok());
        for id in ["Title", "Heading1", "Heading6", "ListParagraph"] {
            assert!(styles.contains(&format!(r#"w:styleId="{id}""#)), "{id}");
        }
    }

    #[test]
    fn text_rendering_separates_blocks() {
        let blocks = [Block::heading("A", 1), Block::paragraph("b c")];
        assert_eq!(render_text(&blocks), "A\n\nb c\n");
        assert_eq!(render_text(&[]), "");
    }
}
