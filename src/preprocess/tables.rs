//! Phase 3: table optimization.
//!
//! Relative widths are pinned to absolute twips against
//! [`STANDARD_CONTENT_WIDTH`] so every engine lays the table out the same
//! way. Borders collapse to one thin black rule; floating-table properties
//! are dropped so tables sit in the text flow.

use super::counters::{FixCategory, FixCounters};
use super::xml::Element;

/// Text column width in twips: 6.5 in, i.e. US Letter minus 1 in margins.
pub const STANDARD_CONTENT_WIDTH: u32 = 9360;

const BORDER_EDGES: [&str; 8] = [
    "w:top", "w:left", "w:bottom", "w:right", "w:start", "w:end", "w:insideH", "w:insideV",
];

pub fn apply(root: &mut Element, counters: &mut FixCounters) {
    root.walk_mut(&mut |el| {
        let changed = match el.name.as_str() {
            "w:tbl" => optimize_table(el),
            "w:tblBorders" | "w:tcBorders" => normalize_borders(el),
            _ => false,
        };
        if changed {
            counters.bump(FixCategory::TablesOptimized);
        }
    });
}

/// Convert an OOXML percentage (`5000` = 100 %, or a literal `"50%"`) to a
/// fraction of the whole.
pub fn pct_fraction(value: &str) -> Option<f64> {
    let v = value.trim();
    if let Some(literal) = v.strip_suffix('%') {
        literal.trim().parse::<f64>().ok().map(|p| p / 100.0)
    } else {
        v.parse::<f64>().ok().map(|fiftieths| fiftieths / 5000.0)
    }
}

fn optimize_table(tbl: &mut Element) -> bool {
    let mut changed = false;
    let grid: Vec<u32> = tbl
        .child("w:tblGrid")
        .map(|g| {
            g.elements()
                .filter(|c| c.is("w:gridCol"))
                .filter_map(|c| c.attr("w:w").and_then(|w| w.parse().ok()))
                .collect()
        })
        .unwrap_or_default();
    let grid_total: u32 = grid.iter().sum();

    let mut table_width = STANDARD_CONTENT_WIDTH;
    if let Some(tbl_pr) = tbl.child_mut("w:tblPr") {
        if let Some(tbl_w) = tbl_pr.child_mut("w:tblW") {
            let fallback = if grid_total > 0 {
                grid_total
            } else {
                STANDARD_CONTENT_WIDTH
            };
            let (width, rewritten) = absolutize(tbl_w, STANDARD_CONTENT_WIDTH, fallback);
            table_width = width;
            changed |= rewritten;
        } else if grid_total > 0 {
            table_width = grid_total;
        }
        changed |= tbl_pr.remove_children(&["w:tblpPr", "w:tblOverlap"]) > 0;
    }

    for row in tbl.elements_mut().filter(|e| e.is("w:tr")) {
        let cells = row.elements().filter(|e| e.is("w:tc")).count().max(1) as u32;
        let mut col = 0usize;
        for cell in row.elements_mut().filter(|e| e.is("w:tc")) {
            let span = cell
                .child("w:tcPr")
                .and_then(|p| p.child("w:gridSpan"))
                .and_then(|s| s.attr("w:val"))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let from_grid: u32 = grid.iter().skip(col).take(span).sum();
            col += span;
            let auto_width = if grid.len() >= col && from_grid > 0 {
                from_grid
            } else {
                table_width / cells
            };
            if let Some(tc_w) = cell.child_mut("w:tcPr").and_then(|p| p.child_mut("w:tcW")) {
                changed |= absolutize(tc_w, table_width, auto_width).1;
            }
        }
    }
    changed
}

/// Rewrite a width element (`w:tblW`/`w:tcW`) to `dxa`.
///
/// Returns the resolved width and whether the element changed.
fn absolutize(el: &mut Element, base: u32, auto_width: u32) -> (u32, bool) {
    let kind = el.attr("w:type").unwrap_or("dxa").to_string();
    let current = el.attr("w:w").unwrap_or("0").to_string();
    let width = match kind.as_str() {
        "pct" => match pct_fraction(&current) {
            Some(f) => (base as f64 * f).round().max(0.0) as u32,
            None => auto_width,
        },
        "auto" | "nil" => auto_width,
        _ => return (current.trim().parse().unwrap_or(auto_width), false),
    };
    el.set_attr("w:w", width.to_string());
    el.set_attr("w:type", "dxa");
    (width, true)
}

fn normalize_borders(borders: &mut Element) -> bool {
    let mut changed = false;
    for edge in borders.elements_mut() {
        if !BORDER_EDGES.contains(&edge.name.as_str()) {
            continue;
        }
        if matches!(edge.attr("w:val"), Some("nil") | Some("none")) {
            continue;
        }
        changed |= edge.set_attr("w:sz", "4");
        changed |= edge.set_attr("w:color", "000000");
        changed |= edge.set_attr("w:space", "0");
    }
    changed
}
