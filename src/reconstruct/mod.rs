//! Heuristic structure recovery for text extracted from a PDF.
//!
//! A PDF page is a bag of positioned glyphs; once pdfium has flattened it to
//! text all that is left of the document structure is line breaks, casing and
//! numbering. [`PdfStructureReconstructor`] turns that back into an ordered
//! sequence of [`Block`]s that [`docx::write_docx`] and [`docx::render_text`]
//! consume.
//!
//! The rules, per line:
//!
//! * **Heading**: shorter than [`HEADING_MAX_CHARS`], no terminal period, and
//!   one of: the next line is blank (end of text counts), the line is all
//!   upper-case, or it starts with `"<digits>. "`.
//! * **List item**: starts with a bullet, `1.`/`1)`, `a.`/`a)`, `iv.` or a
//!   parenthesised enumerator. Text is kept verbatim, marker included.
//! * **Paragraph**: everything else; consecutive lines are joined with a
//!   space until a blank line.
//!
//! Headings are tested before list items, so `"1. Overview"` on its own line
//! is a heading.

pub mod cleanup;
pub mod docx;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lines this long or longer are never headings.
pub const HEADING_MAX_CHARS: usize = 80;

/// Level for headings that are neither all-caps nor numbered.
pub const DEFAULT_HEADING_LEVEL: u8 = 2;

/// Numbered headings never go deeper than this.
pub const MAX_NUMBERED_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Heading,
    ListItem,
    Paragraph,
}

/// One reconstructed structural element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub text: String,
    /// Heading level (1 = top). `None` for other kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl Block {
    pub fn heading(text: impl Into<String>, level: u8) -> Self {
        Self {
            kind: BlockKind::Heading,
            text: text.into(),
            level: Some(level),
        }
    }

    pub fn list_item(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::ListItem,
            text: text.into(),
            level: None,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
            level: None,
        }
    }
}

static RE_NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\. +\S").unwrap());

static RE_LIST_ITEMS: Lazy<[Regex; 5]> = Lazy::new(|| {
    [
        // bullet
        Regex::new(r"^[•●○◦▪▫■□‣⁃∙·*+\-–—]\s+\S").unwrap(),
        // numbered
        Regex::new(r"^\d{1,3}[.)]\s+\S").unwrap(),
        // lettered
        Regex::new(r"^[A-Za-z][.)]\s+\S").unwrap(),
        // roman
        Regex::new(r"^(?i:[ivxlcdm]{1,6})[.)]\s+\S").unwrap(),
        // parenthesised
        Regex::new(r"^\(\s*(?:\d{1,3}|[A-Za-z]|(?i:[ivxlcdm]{1,6}))\s*\)\s+\S").unwrap(),
    ]
});

/// Rebuilds headings, list items and paragraphs from flat text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfStructureReconstructor;

impl PdfStructureReconstructor {
    pub fn new() -> Self {
        Self
    }

    /// Clean raw extracted text, then reconstruct it.
    pub fn reconstruct_raw(&self, raw: &str) -> Vec<Block> {
        self.reconstruct(&cleanup::clean_text(raw))
    }

    /// Reconstruct already-clean text.
    pub fn reconstruct(&self, text: &str) -> Vec<Block> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut blocks = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();

        for (i, line) in lines.iter().copied().enumerate() {
            if line.is_empty() {
                flush(&mut paragraph, &mut blocks);
                continue;
            }
            let next_blank = lines.get(i + 1).is_none_or(|next| next.is_empty());
            // A blank after the last line of a running paragraph ends the
            // paragraph; it does not make that line a heading.
            let starts_block = paragraph.is_empty();
            // Nor does it promote the last item of a list.
            let list = is_list_item(line);
            let marked_list = list && !RE_NUMBERED_HEADING.is_match(line);

            if let Some(level) = heading_level(line, next_blank && starts_block && !marked_list) {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::heading(line, level));
            } else if list {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::list_item(line));
            } else {
                paragraph.push(line);
            }
        }
        flush(&mut paragraph, &mut blocks);
        blocks
    }
}

fn flush(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if !lines.is_empty() {
        blocks.push(Block::paragraph(lines.join(" ")));
        lines.clear();
    }
}

/// `Some(level)` when `line` qualifies as a heading.
fn heading_level(line: &str, next_blank: bool) -> Option<u8> {
    if line.chars().count() >= HEADING_MAX_CHARS || line.ends_with('.') {
        return None;
    }
    let numbered = RE_NUMBERED_HEADING
        .captures(line)
        .map(|caps| caps[1].parse::<u32>().unwrap_or(u32::MAX));
    let upper = is_all_caps(line);

    if !(next_blank || upper || numbered.is_some()) {
        return None;
    }
    Some(if upper {
        1
    } else if let Some(n) = numbered {
        n.clamp(1, MAX_NUMBERED_LEVEL as u32) as u8
    } else {
        DEFAULT_HEADING_LEVEL
    })
}

/// At least two letters, none of them lower-case.
fn is_all_caps(line: &str) -> bool {
    let mut letters = line.chars().filter(|c| c.is_alphabetic());
    let mut count = 0;
    let all_upper = letters.all(|c| {
        count += 1;
        !c.is_lowercase()
    });
    all_upper && count >= 2
}

fn is_list_item(line: &str) -> bool {
    RE_LIST_ITEMS.iter().any(|re| re.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(text: &str) -> Vec<Block> {
        PdfStructureReconstructor::new().reconstruct(text)
    }

    #[test]
    fn all_caps_line_before_blank_is_level_one() {
        let blocks = reconstruct("INTRODUCTION\n\nThis report covers the year.\n");
        assert_eq!(
            blocks,
            [
                Block::heading("INTRODUCTION", 1),
                Block::paragraph("This report covers the year."),
            ]
        );
    }

    #[test]
    fn numbered_heading_level_comes_from_the_number() {
        let blocks = reconstruct("1. Overview\nThe system has three parts.\n\n2. Design\n\n7. Appendix\n");
        assert_eq!(blocks[0], Block::heading("1. Overview", 1));
        assert_eq!(blocks[1], Block::paragraph("The system has three parts."));
        assert_eq!(blocks[2], Block::heading("2. Design", 2));
        // capped
        assert_eq!(blocks[3], Block::heading("7. Appendix", 3));
    }

    #[test]
    fn short_line_before_blank_gets_default_level() {
        let blocks = reconstruct("Results and discussion\n\nWe observed growth.");
        assert_eq!(blocks[0], Block::heading("Results and discussion", DEFAULT_HEADING_LEVEL));
        // end of text counts as blank, but the line ends with a period
        assert_eq!(blocks[1], Block::paragraph("We observed growth."));
    }

    #[test]
    fn end_of_text_counts_as_blank() {
        let blocks = reconstruct("Body text.\n\nSummary");
        assert_eq!(blocks.last(), Some(&Block::heading("Summary", DEFAULT_HEADING_LEVEL)));
    }

    #[test]
    fn long_or_terminated_lines_are_not_headings() {
        let long = "A".repeat(HEADING_MAX_CHARS);
        let blocks = reconstruct(&format!("{long}\n\nENDS WITH A PERIOD.\n"));
        assert!(blocks.iter().all(|b| b.kind == BlockKind::Paragraph));
    }

    #[test]
    fn last_line_of_a_paragraph_stays_in_it() {
        let blocks = reconstruct("The first line of a paragraph\nand its unterminated end\n\nNext");
        assert_eq!(
            blocks[0],
            Block::paragraph("The first line of a paragraph and its unterminated end")
        );
    }

    #[test]
    fn list_patterns_are_recognised_verbatim() {
        let text = "Intro paragraph goes here and continues for a while.\n\
                    • bullet item\n\
                    - dash item\n\
                    3) numbered item\n\
                    b. lettered item\n\
                    iv. roman item\n\
                    (a) parenthesised item\n\
                    Closing text that is a sentence.";
        let blocks = reconstruct(text);
        let items: Vec<&str> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::ListItem)
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(
            items,
            [
                "• bullet item",
                "- dash item",
                "3) numbered item",
                "b. lettered item",
                "iv. roman item",
                "(a) parenthesised item",
            ]
        );
        assert_eq!(blocks.last().unwrap().kind, BlockKind::Paragraph);
    }

    #[test]
    fn last_list_item_before_blank_stays_a_list_item() {
        let blocks = reconstruct("Shopping list
• apples
• pears

(b) optional

Done here.");
        assert_eq!(
            blocks,
            [
                Block::paragraph("Shopping list"),
                Block::list_item("• apples"),
                Block::list_item("• pears"),
                Block::list_item("(b) optional"),
                Block::paragraph("Done here."),
            ]
        );
        // a `<digits>. ` line is still a numbered heading
        assert_eq!(reconstruct("2. Scope

Text.")[0], Block::heading("2. Scope", 2));
    }

    #[test]
    fn raw_text_is_cleaned_first() {
        let blocks = PdfStructureReconstructor::new()
            .reconstruct_raw("SUMMARY\r\n\r\nA hyphen-\r\nated word.\r\n\r\n12\r\n");
        assert_eq!(
            blocks,
            [Block::heading("SUMMARY", 1), Block::paragraph("A hyphenated word.")]
        );
    }

    #[test]
    fn blocks_serialize_with_type_tag() {
        let json = serde_json::to_value(Block::list_item("- x")).unwrap();
        assert_eq!(json["type"], "list-item");
        assert!(json.get("level").is_none());
    }
}
