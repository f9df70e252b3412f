//! Phase 5: effect stripping.
//!
//! Text effects that engines render inconsistently (or not at all) are
//! removed from run properties. Pictures lose their DrawingML effects and
//! are not allowed to overlap other anchored objects.

use super::counters::{FixCategory, FixCounters};
use super::xml::Element;

const TEXT_EFFECTS: [&str; 12] = [
    "w:shadow",
    "w:outline",
    "w:emboss",
    "w:imprint",
    "w:effect",
    "w14:glow",
    "w14:shadow",
    "w14:reflection",
    "w14:textOutline",
    "w14:textFill",
    "w14:props3d",
    "w14:scene3d",
];

const PICTURE_3D: [&str; 2] = ["a:scene3d", "a:sp3d"];

pub fn apply(root: &mut Element, counters: &mut FixCounters) {
    root.walk_mut(&mut |el| match el.name.as_str() {
        "w:rPr" => {
            counters.add(
                FixCategory::EffectsStripped,
                el.remove_children(&TEXT_EFFECTS) as u64,
            );
        }
        "wp:anchor" => {
            if el.attr("allowOverlap").is_some_and(|v| v != "0") {
                el.set_attr("allowOverlap", "0");
                counters.bump(FixCategory::ImagesNormalized);
            }
        }
        "pic:spPr" => {
            let mut changed = el.remove_children(&PICTURE_3D) > 0;
            if let Some(effects) = el.child_mut("a:effectLst") {
                if !effects.children.is_empty() {
                    effects.children.clear();
                    effects.self_closing = true;
                    changed = true;
                }
            }
            if changed {
                counters.bump(FixCategory::ImagesNormalized);
            }
        }
        _ => {}
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::xml::Document;

    fn run(xml: &str) -> (String, FixCounters) {
        let mut doc = Document::parse(xml).unwrap();
        let mut counters = FixCounters::default();
        apply(doc.root_mut().unwrap(), &mut counters);
        (doc.to_xml(), counters)
    }

    #[test]
    fn text_effects_are_removed() {
        let (xml, c) = run(
            r#"<w:rPr><w:b/><w:shadow/><w14:glow w14:rad="63500"><w14:srgbClr w14:val="FF0000"/></w14:glow><w14:textFill/><w:color w:val="000000"/></w:rPr>"#,
        );
        assert_eq!(xml, r#"<w:rPr><w:b/><w:color w:val="000000"/></w:rPr>"#);
        assert_eq!(c.get(FixCategory::EffectsStripped), 3);
    }

    #[test]
    fn pictures_are_flattened() {
        let (xml, c) = run(concat!(
            r#"<w:drawing><wp:anchor allowOverlap="1" behindDoc="0"><pic:pic><pic:spPr>"#,
            r#"<a:effectLst><a:outerShdw blurRad="40000"/></a:effectLst><a:scene3d/>"#,
            r#"</pic:spPr></pic:pic></wp:anchor></w:drawing>"#
        ));
        assert!(xml.contains(r#"<wp:anchor allowOverlap="0" behindDoc="0">"#));
        assert!(xml.contains("<pic:spPr><a:effectLst/></pic:spPr>"));
        assert_eq!(c.get(FixCategory::ImagesNormalized), 2);
    }

    #[test]
    fn second_run_changes_nothing() {
        let (once, _) = run(
            r#"<w:body><w:rPr><w:outline/></w:rPr><wp:anchor allowOverlap="1"><pic:spPr><a:effectLst><a:glow/></a:effectLst></pic:spPr></wp:anchor></w:body>"#,
        );
        let (twice, c) = run(&once);
        assert_eq!(once, twice);
        assert!(c.is_empty());
    }
}
