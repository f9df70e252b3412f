//! Phase 4: spacing and pagination normalization.

use super::counters::{FixCategory, FixCounters};
use super::package::PartKind;
use super::xml::{Element, Node};

/// Twips per single line when an `auto` line rule is made explicit.
pub const SINGLE_LINE_TWIPS: f64 = 264.0;

/// `auto` line values are in 240ths of a line.
const AUTO_LINE_UNIT: f64 = 240.0;

const IND_ATTRS: [&str; 6] = [
    "w:left",
    "w:right",
    "w:start",
    "w:end",
    "w:hanging",
    "w:firstLine",
];

pub fn apply(part: PartKind, root: &mut Element, counters: &mut FixCounters) {
    root.walk_mut(&mut |el| match el.name.as_str() {
        "w:p" if part != PartKind::Styles => {
            if page_break_to_run(el) {
                counters.bump(FixCategory::PaginationFixed);
            }
        }
        "w:pPr" => normalize_ppr(el, counters),
        "w:r" => {
            counters.add(
                FixCategory::PaginationFixed,
                el.remove_children(&["w:lastRenderedPageBreak"]) as u64,
            );
        }
        "w:br" => {
            if el.remove_attr("w:clear").is_some() {
                counters.bump(FixCategory::PaginationFixed);
            }
        }
        "w:sectPr" => {
            if let Some(kind) = el.child_mut("w:type") {
                if matches!(kind.attr("w:val"), Some("evenPage" | "oddPage" | "nextColumn")) {
                    kind.set_attr("w:val", "nextPage");
                    counters.bump(FixCategory::SectionsNormalized);
                }
            }
        }
        _ => {}
    });
}

fn normalize_ppr(ppr: &mut Element, counters: &mut FixCounters) {
    if let Some(spacing) = ppr.child_mut("w:spacing") {
        if normalize_spacing(spacing) {
            counters.bump(FixCategory::SpacingNormalized);
        }
    }
    if let Some(ind) = ppr.child_mut("w:ind") {
        if round_indents(ind) {
            counters.bump(FixCategory::IndentsRounded);
        }
    }
    counters.add(
        FixCategory::PaginationFixed,
        ppr.remove_children(&["w:keepNext", "w:widowControl"]) as u64,
    );
}

fn normalize_spacing(spacing: &mut Element) -> bool {
    let mut changed = false;
    for auto in ["w:beforeAutospacing", "w:afterAutospacing"] {
        changed |= spacing.remove_attr(auto).is_some();
    }
    for key in ["w:before", "w:after"] {
        if spacing.attr(key).is_none() {
            changed |= spacing.set_attr(key, "0");
        }
    }

    let rule = spacing.attr("w:lineRule").unwrap_or("auto").to_string();
    match spacing.attr("w:line").map(|l| l.trim().parse::<f64>()) {
        None => {
            changed |= spacing.set_attr("w:line", "0");
            changed |= spacing.set_attr("w:lineRule", "atLeast");
        }
        Some(Ok(line)) if rule == "auto" => {
            let twips = (line * SINGLE_LINE_TWIPS / AUTO_LINE_UNIT).round() as i64;
            changed |= spacing.set_attr("w:line", twips.to_string());
            changed |= spacing.set_attr("w:lineRule", "atLeast");
        }
        Some(_) if spacing.attr("w:lineRule").is_none() => {
            changed |= spacing.set_attr("w:lineRule", "atLeast");
        }
        Some(_) => {}
    }
    changed
}

fn round_indents(ind: &mut Element) -> bool {
    let mut changed = false;
    for key in IND_ATTRS {
        let Some(value) = ind.attr(key) else {
            continue;
        };
        if value.parse::<i64>().is_ok() {
            continue;
        }
        if let Ok(f) = value.trim().parse::<f64>() {
            changed |= ind.set_attr(key, (f.round() as i64).to_string());
        }
    }
    changed
}

/// Replace `w:pageBreakBefore` on a paragraph with a leading page-break run.
fn page_break_to_run(p: &mut Element) -> bool {
    let Some(ppr) = p.child_mut("w:pPr") else {
        return false;
    };
    let Some(flag) = ppr
        .elements()
        .find(|e| e.is("w:pageBreakBefore"))
        .map(|e| e.attr("w:val").unwrap_or("1").to_string())
    else {
        return false;
    };
    ppr.remove_children(&["w:pageBreakBefore"]);

    if matches!(flag.as_str(), "1" | "true" | "on") {
        let at = p
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is("w:pPr")))
            .map_or(0, |i| i + 1);
        let run = Element::new("w:r").with_child(Element::new("w:br").with_attr("w:type", "page"));
        p.insert(at, run);
    }
    true
}
