//! Source documents to print-ready HTML.
//!
//! The Chromium adapter cannot read office formats, so every source is first
//! lowered to a small block model ([`MarkupBlock`]) and rendered with one
//! fixed stylesheet ([`STYLESHEET`]) plus an `@page` rule carrying the
//! configured page size and margins. Word paragraph styles are mapped onto
//! blocks through [`STYLE_MAP`]; anything unmapped is a plain paragraph.
//!
//! HTML sources are passed through untouched apart from the injected
//! `@page` rule.

use std::path::Path;

use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;

use crate::config::{PageLayout, QualityTier};
use crate::preprocess::xml::{Document, Element};
use crate::preprocess::{DocxPackage, PreprocessError};

/// What a mapped Word paragraph style becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title,
    Subtitle,
    Heading(u8),
    ListItem { ordered: bool },
    Quote,
    Caption,
    Code,
}

/// Word paragraph style id → block role.
pub const STYLE_MAP: &[(&str, Role)] = &[
    ("Title", Role::Title),
    ("Subtitle", Role::Subtitle),
    ("Heading1", Role::Heading(1)),
    ("Heading2", Role::Heading(2)),
    ("Heading3", Role::Heading(3)),
    ("Heading4", Role::Heading(4)),
    ("Heading5", Role::Heading(5)),
    ("Heading6", Role::Heading(6)),
    ("ListParagraph", Role::ListItem { ordered: false }),
    ("ListBullet", Role::ListItem { ordered: false }),
    ("ListNumber", Role::ListItem { ordered: true }),
    ("Quote", Role::Quote),
    ("IntenseQuote", Role::Quote),
    ("Caption", Role::Caption),
    ("HTMLPreformatted", Role::Code),
    ("PlainText", Role::Code),
];

/// `(selector, declarations)` pairs of the print stylesheet.
pub const STYLESHEET: &[(&str, &str)] = &[
    ("html", "font-size: 11pt;"),
    ("body", "margin: 0; font-family: 'Liberation Serif', 'Times New Roman', serif; line-height: 1.35; color: #000;"),
    ("h1", "font-size: 20pt; margin: 0 0 10pt;"),
    ("h2", "font-size: 16pt; margin: 14pt 0 8pt;"),
    ("h3", "font-size: 13pt; margin: 12pt 0 6pt;"),
    ("h4, h5, h6", "font-size: 11pt; margin: 10pt 0 4pt;"),
    ("h1, h2, h3, h4, h5, h6", "font-family: 'Liberation Sans', Arial, sans-serif; page-break-after: avoid;"),
    ("p", "margin: 0 0 8pt;"),
    ("p.title", "font-size: 26pt; font-weight: bold; margin-bottom: 4pt;"),
    ("p.subtitle", "font-size: 14pt; color: #444; margin-bottom: 14pt;"),
    ("p.caption", "font-size: 9pt; font-style: italic;"),
    ("p.plain", "white-space: pre-wrap; font-family: 'Liberation Mono', monospace; font-size: 10pt;"),
    ("blockquote", "margin: 0 0 8pt 24pt; font-style: italic;"),
    ("pre", "white-space: pre-wrap; font-family: 'Liberation Mono', monospace; font-size: 9.5pt; background: #f4f4f4; padding: 6pt;"),
    ("ul, ol", "margin: 0 0 8pt 0; padding-left: 24pt;"),
    ("table", "border-collapse: collapse; width: 100%; margin: 0 0 8pt;"),
    ("td, th", "border: 0.5pt solid #000; padding: 3pt 5pt; vertical-align: top;"),
    ("hr", "border: none; border-top: 0.5pt solid #000;"),
    (".page-break", "page-break-after: always;"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupBlock {
    Heading { level: u8, html: String },
    Paragraph { html: String, class: Option<&'static str> },
    ListItem { ordered: bool, html: String },
    Quote(String),
    Code(String),
    Table(Vec<Vec<String>>),
    Rule,
    PageBreak,
}

pub fn role_for_style(style_id: &str) -> Option<Role> {
    STYLE_MAP
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(style_id))
        .map(|(_, role)| *role)
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Full HTML document for `blocks`.
pub fn render_document(
    blocks: &[MarkupBlock],
    title: &str,
    layout: &PageLayout,
    quality: QualityTier,
) -> String {
    let mut body = String::new();
    let mut open_list: Option<bool> = None;

    for block in blocks {
        let list_kind = match block {
            MarkupBlock::ListItem { ordered, .. } => Some(*ordered),
            _ => None,
        };
        if open_list.is_some() && open_list != list_kind {
            body.push_str(if open_list == Some(true) { "</ol>\n" } else { "</ul>\n" });
            open_list = None;
        }
        if open_list.is_none() {
            if let Some(ordered) = list_kind {
                body.push_str(if ordered { "<ol>\n" } else { "<ul>\n" });
                open_list = Some(ordered);
            }
        }

        match block {
            MarkupBlock::Heading { level, html } => {
                let level = (*level).clamp(1, 6);
                body.push_str(&format!("<h{level}>{html}</h{level}>\n"));
            }
            MarkupBlock::Paragraph { html, class: Some(class) } => {
                body.push_str(&format!("<p class=\"{class}\">{html}</p>\n"));
            }
            MarkupBlock::Paragraph { html, class: None } => {
                body.push_str(&format!("<p>{html}</p>\n"));
            }
            MarkupBlock::ListItem { html, .. } => body.push_str(&format!("<li>{html}</li>\n")),
            MarkupBlock::Quote(html) => body.push_str(&format!("<blockquote>{html}</blockquote>\n")),
            MarkupBlock::Code(text) => body.push_str(&format!("<pre>{}</pre>\n", escape(text.as_str()))),
            MarkupBlock::Table(rows) => {
                body.push_str("<table>\n");
                for row in rows {
                    body.push_str("<tr>");
                    for cell in row {
                        body.push_str(&format!("<td>{cell}</td>"));
                    }
                    body.push_str("</tr>\n");
                }
                body.push_str("</table>\n");
            }
            MarkupBlock::Rule => body.push_str("<hr>\n"),
            MarkupBlock::PageBreak => body.push_str("<div class=\"page-break\"></div>\n"),
        }
    }
    if let Some(ordered) = open_list {
        body.push_str(if ordered { "</ol>\n" } else { "</ul>\n" });
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        stylesheet(layout, quality),
        body
    )
}

fn stylesheet(layout: &PageLayout, quality: QualityTier) -> String {
    let mut css = layout.css_page_rule();
    css.push('\n');
    for (selector, decls) in STYLESHEET {
        css.push_str(&format!("{selector} {{ {decls} }}\n"));
    }
    // Draft output drops backgrounds; the other tiers print them as shown.
    let adjust = match quality {
        QualityTier::Draft => "economy",
        QualityTier::Standard | QualityTier::High => "exact",
    };
    css.push_str(&format!(
        "* {{ -webkit-print-color-adjust: {adjust}; print-color-adjust: {adjust}; }}\n"
    ));
    css
}

/// Add the `@page` rule to an existing HTML document.
pub fn inject_page_style(html: &str, layout: &PageLayout) -> String {
    let style = format!("<style>{}</style>", layout.css_page_rule());
    static RE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());
    match RE_HEAD.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.end()], style, &html[m.end()..]),
        None => format!("{style}\n{html}"),
    }
}

// ── Plain text ───────────────────────────────────────────────────────────────

/// Paragraphs at blank lines; line breaks inside a paragraph are kept.
pub fn from_text(text: &str) -> Vec<MarkupBlock> {
    let text = text.replace("\r\n", "\n");
    text.split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| MarkupBlock::Paragraph {
            html: p
                .trim_matches('\n')
                .lines()
                .map(|l| escape(l).into_owned())
                .collect::<Vec<_>>()
                .join("<br>"),
            class: Some("plain"),
        })
        .collect()
}

// ── Markdown ─────────────────────────────────────────────────────────────────

static RE_MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").unwrap());
static RE_MD_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.*)$").unwrap());
static RE_MD_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,9}[.)]\s+(.*)$").unwrap());
static RE_MD_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap());

static RE_MD_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_MD_STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").unwrap());
static RE_MD_EM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*|\b_([^_]+)_\b").unwrap());
static RE_MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

/// CommonMark subset: ATX headings, lists, block quotes, fenced code,
/// pipe tables, rules and inline emphasis/code/links.
pub fn from_markdown(md: &str) -> Vec<MarkupBlock> {
    let md = md.replace("\r\n", "\n");
    let lines: Vec<&str> = md.lines().collect();
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            flush_paragraph(&mut paragraph, &mut blocks);
            let fence = &trimmed[..3];
            let mut code = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim_start().starts_with(fence) {
                code.push(lines[i]);
                i += 1;
            }
            blocks.push(MarkupBlock::Code(code.join("\n")));
            i += 1;
            continue;
        }

        if is_table_row(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            let mut rows = Vec::new();
            while i < lines.len() && is_table_row(lines[i].trim()) {
                let row = lines[i].trim();
                if !is_separator_row(row) {
                    rows.push(
                        row.trim_matches('|')
                            .split('|')
                            .map(|c| inline(c.trim()))
                            .collect(),
                    );
                }
                i += 1;
            }
            blocks.push(MarkupBlock::Table(rows));
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
        } else if let Some(caps) = RE_MD_HEADING.captures(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(MarkupBlock::Heading {
                level: caps[1].len() as u8,
                html: inline(&caps[2]),
            });
        } else if RE_MD_RULE.is_match(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(MarkupBlock::Rule);
        } else if let Some(caps) = RE_MD_BULLET.captures(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(MarkupBlock::ListItem {
                ordered: false,
                html: inline(&caps[1]),
            });
        } else if let Some(caps) = RE_MD_ORDERED.captures(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(MarkupBlock::ListItem {
                ordered: true,
                html: inline(&caps[1]),
            });
        } else if let Some(quote) = trimmed.strip_prefix('>') {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(MarkupBlock::Quote(inline(quote.trim())));
        } else {
            paragraph.push(trimmed);
        }
        i += 1;
    }
    flush_paragraph(&mut paragraph, &mut blocks);
    blocks
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<MarkupBlock>) {
    if !lines.is_empty() {
        blocks.push(MarkupBlock::Paragraph {
            html: inline(&lines.join(" ")),
            class: None,
        });
        lines.clear();
    }
}

/// Escape, then apply inline Markdown.
fn inline(text: &str) -> String {
    let s = escape(text).into_owned();
    let s = RE_MD_CODE.replace_all(&s, "<code>$1</code>");
    let s = RE_MD_STRONG.replace_all(&s, "<strong>$1$2</strong>");
    let s = RE_MD_EM.replace_all(&s, "<em>$1$2</em>");
    RE_MD_LINK.replace_all(&s, "<a href=\"$2\">$1</a>").into_owned()
}

fn is_table_row(line: &str) -> bool {
    line.starts_with('|') && line.ends_with('|') && line.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    line.starts_with('|') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

/// Lower the body of a `.docx` package. Blocking.
pub fn from_docx(path: &Path) -> Result<Vec<MarkupBlock>, PreprocessError> {
    let mut pkg = DocxPackage::open(path)?;
    let xml = pkg
        .read_text("word/document.xml")?
        .ok_or_else(|| PreprocessError::NotAPackage("missing part 'word/document.xml'".into()))?;
    let doc = Document::parse(&xml).map_err(|source| PreprocessError::Xml {
        part: "word/document.xml".into(),
        source,
    })?;

    let mut blocks = Vec::new();
    if let Some(body) = doc.root().and_then(|r| r.child("w:body")) {
        lower_container(body, &mut blocks);
    }
    Ok(blocks)
}

fn lower_container(container: &Element, blocks: &mut Vec<MarkupBlock>) {
    for el in container.elements() {
        match el.name.as_str() {
            "w:p" => lower_paragraph(el, blocks),
            "w:tbl" => blocks.push(lower_table(el)),
            "w:sdt" => {
                if let Some(content) = el.child("w:sdtContent") {
                    lower_container(content, blocks);
                }
            }
            _ => {}
        }
    }
}

fn lower_paragraph(p: &Element, blocks: &mut Vec<MarkupBlock>) {
    let ppr = p.child("w:pPr");
    if ppr.is_some_and(|ppr| ppr.has_child("w:pageBreakBefore")) {
        blocks.push(MarkupBlock::PageBreak);
    }
    let (html, page_break) = paragraph_inline(p);

    let style = ppr
        .and_then(|ppr| ppr.child("w:pStyle"))
        .and_then(|s| s.attr("w:val"))
        .and_then(role_for_style);
    let numbered = ppr.is_some_and(|ppr| ppr.has_child("w:numPr"));

    if !html.trim().is_empty() {
        blocks.push(match (style, numbered) {
            (Some(Role::Heading(level)), _) => MarkupBlock::Heading { level, html },
            (Some(Role::Title), _) => MarkupBlock::Paragraph { html, class: Some("title") },
            (Some(Role::Subtitle), _) => MarkupBlock::Paragraph { html, class: Some("subtitle") },
            (Some(Role::Caption), _) => MarkupBlock::Paragraph { html, class: Some("caption") },
            (Some(Role::Quote), _) => MarkupBlock::Quote(html),
            (Some(Role::Code), _) => MarkupBlock::Paragraph { html, class: Some("plain") },
            (Some(Role::ListItem { ordered }), _) => MarkupBlock::ListItem { ordered, html },
            (None, true) => MarkupBlock::ListItem { ordered: false, html },
            (None, false) => MarkupBlock::Paragraph { html, class: None },
        });
    }
    if page_break {
        blocks.push(MarkupBlock::PageBreak);
    }
}

/// Inline HTML of a paragraph, plus whether it contains a page break.
fn paragraph_inline(p: &Element) -> (String, bool) {
    let mut html = String::new();
    let mut page_break = false;
    for el in p.elements() {
        match el.name.as_str() {
            "w:r" => page_break |= run_inline(el, &mut html),
            "w:hyperlink" | "w:ins" | "w:smartTag" => {
                for r in el.elements().filter(|r| r.is("w:r")) {
                    page_break |= run_inline(r, &mut html);
                }
            }
            _ => {}
        }
    }
    (html, page_break)
}

fn run_inline(r: &Element, out: &mut String) -> bool {
    let rpr = r.child("w:rPr");
    let on = |name: &str| {
        rpr.and_then(|rpr| rpr.child(name))
            .is_some_and(|e| !matches!(e.attr("w:val"), Some("0" | "false" | "none")))
    };
    let (bold, italic, underline) = (on("w:b"), on("w:i"), on("w:u"));

    let mut text = String::new();
    let mut page_break = false;
    for el in r.elements() {
        match el.name.as_str() {
            "w:t" => text.push_str(&escape(el.text().as_str())),
            "w:tab" => text.push_str("&emsp;"),
            "w:br" if el.attr("w:type") == Some("page") => page_break = true,
            "w:br" | "w:cr" => text.push_str("<br>"),
            _ => {}
        }
    }
    if text.is_empty() {
        return page_break;
    }
    if underline {
        text = format!("<u>{text}</u>");
    }
    if italic {
        text = format!("<em>{text}</em>");
    }
    if bold {
        text = format!("<strong>{text}</strong>");
    }
    out.push_str(&text);
    page_break
}

fn lower_table(tbl: &Element) -> MarkupBlock {
    let rows = tbl
        .elements()
        .filter(|e| e.is("w:tr"))
        .map(|tr| {
            tr.elements()
                .filter(|e| e.is("w:tc"))
                .map(|tc| {
                    tc.elements()
                        .filter(|e| e.is("w:p"))
                        .map(|p| paragraph_inline(p).0)
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join("<br>")
                })
                .collect()
        })
        .collect();
    MarkupBlock::Table(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::package::tests::write_package;

    #[test]
    fn style_map_lookup_ignores_case() {
        assert_eq!(role_for_style("heading2"), Some(Role::Heading(2)));
        assert_eq!(role_for_style("ListNumber"), Some(Role::ListItem { ordered: true }));
        assert_eq!(role_for_style("BodyText"), None);
    }

    #[test]
    fn markdown_blocks() {
        let md = "# Title\n\nSome **bold** and *em* text\nwrapped.\n\n- one\n- two\n1. first\n\n> quoted\n\n```\nlet x = 1 < 2;\n```\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n\n---\n";
        let blocks = from_markdown(md);
        assert_eq!(
            blocks,
            [
                MarkupBlock::Heading { level: 1, html: "Title".into() },
                MarkupBlock::Paragraph {
                    html: "Some <strong>bold</strong> and <em>em</em> text wrapped.".into(),
                    class: None
                },
                MarkupBlock::ListItem { ordered: false, html: "one".into() },
                MarkupBlock::ListItem { ordered: false, html: "two".into() },
                MarkupBlock::ListItem { ordered: true, html: "first".into() },
                MarkupBlock::Quote("quoted".into()),
                MarkupBlock::Code("let x = 1 < 2;".into()),
                MarkupBlock::Table(vec![
                    vec!["A".into(), "B".into()],
                    vec!["1".into(), "2".into()]
                ]),
                MarkupBlock::Rule,
            ]
        );
    }

    #[test]
    fn markdown_inline_is_escaped_first() {
        let blocks = from_markdown("a <script> & [link](https://x.org) `c`");
        assert_eq!(
            blocks,
            [MarkupBlock::Paragraph {
                html: "a &lt;script&gt; &amp; <a href=\"https://x.org\">link</a> <code>c</code>".into(),
                class: None
            }]
        );
    }

    #[test]
    fn text_keeps_line_breaks() {
        let blocks = from_text("line 1\nline <2>\n\n\nnext");
        assert_eq!(
            blocks,
            [
                MarkupBlock::Paragraph { html: "line 1<br>line &lt;2&gt;".into(), class: Some("plain") },
                MarkupBlock::Paragraph { html: "next".into(), class: Some("plain") },
            ]
        );
    }

    #[test]
    fn lists_are_grouped_and_closed() {
        let html = render_document(
            &[
                MarkupBlock::ListItem { ordered: false, html: "a".into() },
                MarkupBlock::ListItem { ordered: false, html: "b".into() },
                MarkupBlock::ListItem { ordered: true, html: "c".into() },
                MarkupBlock::Paragraph { html: "end".into(), class: None },
            ],
            "T & C",
            &PageLayout::default(),
            QualityTier::Standard,
        );
        assert!(html.contains("<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n<ol>\n<li>c</li>\n</ol>\n<p>end</p>"));
        assert!(html.contains("<title>T &amp; C</title>"));
        assert!(html.contains("@page { size: 210mm 297mm; margin: 20mm; }"));
        assert!(html.contains("print-color-adjust: exact"));
    }

    #[test]
    fn page_style_is_injected_into_head() {
        let layout = PageLayout::default();
        let out = inject_page_style("<html><HEAD lang=\"en\"><title>x</title></head></html>", &layout);
        assert!(out.starts_with("<html><HEAD lang=\"en\"><style>@page"));
        let bare = inject_page_style("<p>hi</p>", &layout);
        assert!(bare.starts_with("<style>@page"));
        assert!(bare.ends_with("<p>hi</p>"));
    }

    #[test]
    fn docx_body_is_lowered() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.docx");
        let document = concat!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r><w:t xml:space="preserve"> &amp; plain</w:t></w:r><w:r><w:br w:type="page"/></w:r></w:p>"#,
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:rPr><w:i w:val="0"/></w:rPr><w:t>item</w:t></w:r></w:p>"#,
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>c1</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc></w:tr></w:tbl>"#,
            r#"<w:sectPr/></w:body></w:document>"#
        );
        write_package(
            &path,
            &[
                ("[Content_Types].xml", b"<Types/>".as_slice()),
                ("word/document.xml", document.as_bytes()),
            ],
        );

        let blocks = from_docx(&path).unwrap();
        assert_eq!(
            blocks,
            [
                MarkupBlock::Heading { level: 1, html: "Intro".into() },
                MarkupBlock::Paragraph { html: "<strong>Bold</strong> &amp; plain".into(), class: None },
                MarkupBlock::PageBreak,
                MarkupBlock::ListItem { ordered: false, html: "item".into() },
                MarkupBlock::Table(vec![vec!["c1".into(), String::new()]]),
            ]
        );
    }
}
