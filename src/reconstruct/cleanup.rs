//! Deterministic cleanup of text extracted from a PDF.
//!
//! pdfium returns text in reading order, but with the page furniture and
//! typesetting artefacts still in it: running page numbers, words split
//! across a line break with a hyphen, form feeds between pages, invisible
//! joiners. The structure heuristics in [`super`] work line by line, so
//! these are removed first.
//!
//! ## Rule order
//!
//! Line endings are normalised before anything splits on `\n`, trailing
//! whitespace goes before hyphen joining (so `exam- \nple` still joins), and
//! page-number lines are dropped before blank lines are collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule, in order.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = join_hyphenated_breaks(&s);
    let s = remove_page_number_lines(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Line endings and page breaks ─────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{000C}', "\n\n")
}

// ── Rule 2: Invisible and non-breaking characters ───────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .replace(
            [
                '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
            ],
            "",
        )
        .replace('\u{00A0}', " ")
}

// ── Rule 3: Trailing whitespace ──────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Words hyphenated across a line break ────────────────────────────
//
// Only a lower-case continuation is joined: `Smith-\nJones` is more likely a
// real compound than a typesetting split.

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Alphabetic})-\n(\p{Lowercase})").unwrap());

fn join_hyphenated_breaks(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

// ── Rule 5: Page-number lines ────────────────────────────────────────────────

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:(?:page|p\.)[ \t]*\d{1,4}(?:[ \t]*(?:of|/)[ \t]*\d{1,4})?|\d{1,4}|[-–—][ \t]*\d{1,4}[ \t]*[-–—])[ \t]*$",
    )
    .unwrap()
});

fn remove_page_number_lines(input: &str) -> String {
    RE_PAGE_NUMBER.replace_all(input, "").to_string()
}

// ── Rule 6: Collapse blank lines ─────────────────────────────────────────────
//
// Paragraphs are split at a single blank line, so more than one carries no
// extra meaning.

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 7: Single final newline ─────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
