//! Phase 1: font normalization.
//!
//! Proprietary fonts are swapped for metric-compatible (or close) open fonts
//! the rendering engine actually has. When a substitute runs wider or
//! narrower, explicit point sizes in the same part are scaled by its
//! multiplier so line breaks land where the author saw them. The first
//! non-unity multiplier seen in a part is the one applied to that part.

use super::counters::{FixCategory, FixCounters};
use super::package::PartKind;
use super::xml::Element;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSubstitution {
    pub source: &'static str,
    pub target: &'static str,
    pub size_multiplier: f64,
}

const fn sub(source: &'static str, target: &'static str, size_multiplier: f64) -> FontSubstitution {
    FontSubstitution {
        source,
        target,
        size_multiplier,
    }
}

/// Static source → target table. No target appears as a source, which is
/// what makes the phase idempotent.
pub static FONT_MAP: &[FontSubstitution] = &[
    sub("Calibri", "Carlito", 1.0),
    sub("Calibri Light", "Carlito", 1.0),
    sub("Cambria", "Caladea", 1.0),
    sub("Cambria Math", "Caladea", 1.0),
    sub("Arial", "Liberation Sans", 1.0),
    sub("Helvetica", "Liberation Sans", 1.0),
    sub("Arial Narrow", "Liberation Sans Narrow", 1.0),
    sub("Times New Roman", "Liberation Serif", 1.0),
    sub("Times", "Liberation Serif", 1.0),
    sub("Courier New", "Liberation Mono", 1.0),
    sub("Courier", "Liberation Mono", 1.0),
    sub("Consolas", "DejaVu Sans Mono", 0.92),
    sub("Aptos", "Liberation Sans", 0.98),
    sub("Aptos Display", "Liberation Sans", 0.98),
    sub("Segoe UI", "DejaVu Sans", 0.95),
    sub("Tahoma", "DejaVu Sans", 0.94),
    sub("Verdana", "DejaVu Sans", 0.92),
    sub("Georgia", "DejaVu Serif", 0.96),
    sub("Century Gothic", "URW Gothic", 1.0),
    sub("Garamond", "EB Garamond", 1.0),
    sub("Book Antiqua", "TeX Gyre Pagella", 1.0),
    sub("Palatino Linotype", "TeX Gyre Pagella", 1.0),
];

/// Look up a substitution, ignoring case and surrounding whitespace.
pub fn substitute(font: &str) -> Option<&'static FontSubstitution> {
    let font = font.trim();
    FONT_MAP.iter().find(|s| s.source.eq_ignore_ascii_case(font))
}

/// Major/minor fonts declared by the package theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeFonts {
    pub major: String,
    pub minor: String,
}

impl Default for ThemeFonts {
    /// The stock Office theme.
    fn default() -> Self {
        Self {
            major: "Calibri Light".into(),
            minor: "Calibri".into(),
        }
    }
}

impl ThemeFonts {
    /// Read `a:majorFont/a:latin` and `a:minorFont/a:latin` from a theme part.
    pub fn from_theme(root: &Element) -> Self {
        let mut fonts = Self::default();
        root.walk(&mut |el| {
            let slot = match el.name.as_str() {
                "a:majorFont" => &mut fonts.major,
                "a:minorFont" => &mut fonts.minor,
                _ => return,
            };
            if let Some(face) = el
                .child("a:latin")
                .and_then(|l| l.attr("typeface"))
                .filter(|f| !f.is_empty())
            {
                *slot = face.to_string();
            }
        });
        fonts
    }

    /// Resolve a `w:*Theme` value such as `minorHAnsi` or `majorBidi`.
    fn resolve(&self, theme_value: &str) -> &str {
        if theme_value.starts_with("major") {
            &self.major
        } else {
            &self.minor
        }
    }
}

/// Explicit font attribute and the theme attribute that overrides it.
const FONT_SLOTS: [(&str, &str); 4] = [
    ("w:ascii", "w:asciiTheme"),
    ("w:hAnsi", "w:hAnsiTheme"),
    ("w:eastAsia", "w:eastAsiaTheme"),
    ("w:cs", "w:cstheme"),
];

pub fn apply(part: PartKind, root: &mut Element, theme: &ThemeFonts, counters: &mut FixCounters) {
    let mut multiplier: Option<f64> = None;

    root.walk_mut(&mut |el| match el.name.as_str() {
        "w:rFonts" => normalize_rfonts(el, theme, &mut multiplier, counters),
        "a:latin" | "a:ea" | "a:cs" => {
            let Some(face) = el.attr("typeface") else {
                return;
            };
            // "+mn-lt" style references resolve through the theme part, which is not rewritten
            if face.starts_with('+') {
                return;
            }
            if let Some(s) = substitute(face) {
                el.set_attr("typeface", s.target);
                note_multiplier(&mut multiplier, s);
                counters.bump(FixCategory::FontsNormalized);
            }
        }
        _ => {}
    });

    if let Some(m) = multiplier {
        scale_sizes(root, m, counters);
    }

    if part == PartKind::Styles {
        ensure_default_fonts(root, theme, counters);
    }
}

fn note_multiplier(multiplier: &mut Option<f64>, s: &FontSubstitution) {
    if multiplier.is_none() && (s.size_multiplier - 1.0).abs() > f64::EPSILON {
        *multiplier = Some(s.size_multiplier);
    }
}

fn normalize_rfonts(
    el: &mut Element,
    theme: &ThemeFonts,
    multiplier: &mut Option<f64>,
    counters: &mut FixCounters,
) {
    let mut stripped = false;
    for (explicit, themed) in FONT_SLOTS {
        if let Some(theme_value) = el.remove_attr(themed) {
            el.set_attr(explicit, theme.resolve(&theme_value).to_string());
            stripped = true;
        }
    }
    if el.remove_attr("w:hint").is_some() {
        stripped = true;
    }
    if stripped {
        counters.bump(FixCategory::ThemeFontsStripped);
    }

    for (explicit, _) in FONT_SLOTS {
        let Some(current) = el.attr(explicit) else {
            continue;
        };
        if let Some(s) = substitute(current) {
            el.set_attr(explicit, s.target);
            note_multiplier(multiplier, s);
            counters.bump(FixCategory::FontsNormalized);
        }
    }
}

fn scale_sizes(root: &mut Element, multiplier: f64, counters: &mut FixCounters) {
    root.walk_mut(&mut |el| {
        if !(el.is("w:sz") || el.is("w:szCs")) {
            return;
        }
        let Some(val) = el.attr("w:val").and_then(|v| v.trim().parse::<f64>().ok()) else {
            return;
        };
        let scaled = ((val * multiplier).round() as i64).max(1);
        if el.set_attr("w:val", scaled.to_string()) {
            counters.bump(FixCategory::FontsScaled);
        }
    });
}

/// Give `w:docDefaults` an explicit font so runs that inherit everything
/// still end up with a concrete face.
fn ensure_default_fonts(root: &mut Element, theme: &ThemeFonts, counters: &mut FixCounters) {
    let Some(defaults) = root.child_mut("w:docDefaults") else {
        return;
    };
    let rpr = defaults.ensure_child("w:rPrDefault").ensure_child("w:rPr");
    if rpr.child("w:rFonts").is_none() {
        rpr.insert(0, Element::new("w:rFonts"));
    }
    let Some(fonts) = rpr.child_mut("w:rFonts") else {
        return;
    };
    let minor = substitute(&theme.minor)
        .map(|s| s.target)
        .unwrap_or(theme.minor.as_str())
        .to_string();
    let mut added = false;
    for key in ["w:ascii", "w:hAnsi", "w:eastAsia", "w:cs"] {
        if fonts.attr(key).is_none() {
            fonts.set_attr(key, minor.clone());
            added = true;
        }
    }
    if added {
        counters.bump(FixCategory::FontsNormalized);
    }
}
