//! Phase 2: color normalization.
//!
//! Theme color references (`w:themeColor`, `w:themeFill`, `a:schemeClr`)
//! become explicit RGB hex. Shade/tint modifiers are folded into the value
//! and removed. `auto` becomes black for text/lines and white for fills;
//! three-digit hex is widened to six digits.

use super::counters::{FixCategory, FixCounters};
use super::xml::Element;

/// Static theme palette (stock Office theme).
pub static THEME_COLORS: &[(&str, &str)] = &[
    ("accent1", "4472C4"),
    ("accent2", "ED7D31"),
    ("accent3", "A5A5A5"),
    ("accent4", "FFC000"),
    ("accent5", "5B9BD5"),
    ("accent6", "70AD47"),
    ("text1", "000000"),
    ("dark1", "000000"),
    ("tx1", "000000"),
    ("dk1", "000000"),
    ("background1", "FFFFFF"),
    ("light1", "FFFFFF"),
    ("bg1", "FFFFFF"),
    ("lt1", "FFFFFF"),
    ("text2", "44546A"),
    ("dark2", "44546A"),
    ("tx2", "44546A"),
    ("dk2", "44546A"),
    ("background2", "E7E6E6"),
    ("light2", "E7E6E6"),
    ("bg2", "E7E6E6"),
    ("lt2", "E7E6E6"),
    ("hyperlink", "0563C1"),
    ("hlink", "0563C1"),
    ("followedHyperlink", "954F72"),
    ("folHlink", "954F72"),
];

pub fn theme_color(token: &str) -> Option<&'static str> {
    THEME_COLORS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, hex)| *hex)
}

const TEXT_THEME_ATTRS: [&str; 3] = ["w:themeColor", "w:themeShade", "w:themeTint"];
const FILL_THEME_ATTRS: [&str; 3] = ["w:themeFill", "w:themeFillShade", "w:themeFillTint"];

pub fn apply(root: &mut Element, counters: &mut FixCounters) {
    root.walk_mut(&mut |el| {
        let changed = if el.is("a:schemeClr") {
            scheme_to_srgb(el)
        } else if el.name.starts_with("w:") {
            normalize_word_color(el)
        } else {
            false
        };
        if changed {
            counters.bump(FixCategory::ColorsConverted);
        }
    });
}

fn normalize_word_color(el: &mut Element) -> bool {
    // w:color keeps its value in w:val; everything else (w:u, borders, w:shd) in w:color
    let color_attr = if el.is("w:color") { "w:val" } else { "w:color" };
    let mut changed = false;

    if let Some(hex) = resolve_theme(el, TEXT_THEME_ATTRS) {
        el.set_attr(color_attr, hex);
        changed = true;
    }
    if strip(el, &TEXT_THEME_ATTRS) {
        changed = true;
    }

    if let Some(hex) = resolve_theme(el, FILL_THEME_ATTRS) {
        el.set_attr("w:fill", hex);
        changed = true;
    }
    if strip(el, &FILL_THEME_ATTRS) {
        changed = true;
    }

    changed |= normalize_value(el, color_attr, "000000");
    changed |= normalize_value(el, "w:fill", "FFFFFF");
    changed
}

/// Resolve `[token, shade, tint]` attributes to hex, if the token is known.
fn resolve_theme(el: &Element, attrs: [&str; 3]) -> Option<String> {
    let [token_attr, shade_attr, tint_attr] = attrs;
    let base = theme_color(el.attr(token_attr)?)?;
    let mut rgb = parse_hex(base)?;
    if let Some(shade) = el.attr(shade_attr).and_then(parse_byte) {
        rgb = rgb.map(|c| (c as f64 * shade as f64 / 255.0).round() as u8);
    }
    if let Some(tint) = el.attr(tint_attr).and_then(parse_byte) {
        rgb = rgb.map(|c| (255.0 - (255.0 - c as f64) * tint as f64 / 255.0).round() as u8);
    }
    Some(format!("{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2]))
}

fn strip(el: &mut Element, attrs: &[&str]) -> bool {
    let mut removed = false;
    for a in attrs {
        removed |= el.remove_attr(a).is_some();
    }
    removed
}

fn normalize_value(el: &mut Element, attr: &str, auto: &str) -> bool {
    let Some(value) = el.attr(attr) else {
        return false;
    };
    let replacement = if value.eq_ignore_ascii_case("auto") {
        auto.to_string()
    } else if let Some(wide) = widen_hex(value) {
        wide
    } else {
        return false;
    };
    el.set_attr(attr, replacement)
}

fn scheme_to_srgb(el: &mut Element) -> bool {
    let Some(hex) = el.attr("val").and_then(theme_color) else {
        // phClr and friends only make sense inside the theme itself
        return false;
    };
    let hex = hex.to_string();
    el.name = "a:srgbClr".into();
    el.attrs.clear();
    el.set_attr("val", hex);
    el.children.clear();
    el.self_closing = true;
    true
}

fn widen_hex(value: &str) -> Option<String> {
    let v = value.trim_start_matches('#');
    if v.len() == 3 && v.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(
            v.chars()
                .flat_map(|c| [c, c])
                .collect::<String>()
                .to_ascii_uppercase(),
        )
    } else {
        None
    }
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    if hex.len() != 6 {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([byte(0)?, byte(2)?, byte(4)?])
}

fn parse_byte(v: &str) -> Option<u8> {
    u8::from_str_radix(v.trim(), 16).ok()
}
