//! Phase 6: style flattening (styles part only).
//!
//! `w:basedOn` and `w:next` are removed from every style. In
//! [`StyleFlattening::ResolveInherited`] mode the properties a style used to
//! inherit are first copied into it, nearest ancestor winning, so rendering
//! does not change when the chain disappears.

use std::collections::{HashMap, HashSet};

use super::counters::{FixCategory, FixCounters};
use super::xml::{Element, Node};
use crate::config::StyleFlattening;

/// Property containers in schema order.
const CONTAINERS: [&str; 5] = ["w:pPr", "w:rPr", "w:tblPr", "w:trPr", "w:tcPr"];

/// Deep enough for any real document; also bounds malformed chains.
const MAX_CHAIN: usize = 32;

pub fn apply(root: &mut Element, mode: StyleFlattening, counters: &mut FixCounters) {
    let originals: HashMap<String, Element> = root
        .elements()
        .filter(|e| e.is("w:style"))
        .filter_map(|s| s.attr("w:styleId").map(|id| (id.to_string(), s.clone())))
        .collect();

    for style in root.elements_mut().filter(|e| e.is("w:style")) {
        if mode == StyleFlattening::ResolveInherited {
            for parent in ancestors(style, &originals) {
                inherit(style, parent);
            }
        }
        if style.remove_children(&["w:basedOn", "w:next"]) > 0 {
            counters.bump(FixCategory::StylesFlattened);
        }
    }
}

/// `basedOn` chain of `style`, nearest first. Stops at cycles and unknown ids.
fn ancestors<'a>(style: &Element, originals: &'a HashMap<String, Element>) -> Vec<&'a Element> {
    let mut seen: HashSet<&str> = HashSet::new();
    if let Some(id) = style.attr("w:styleId") {
        seen.insert(id);
    }
    let mut chain = Vec::new();
    let mut next = based_on(style).map(str::to_string);
    while let Some(id) = next.take() {
        if chain.len() >= MAX_CHAIN {
            break;
        }
        let Some((key, parent)) = originals.get_key_value(id.as_str()) else {
            break;
        };
        if !seen.insert(key.as_str()) {
            break;
        }
        chain.push(parent);
        next = based_on(parent).map(str::to_string);
    }
    chain
}

fn based_on(style: &Element) -> Option<&str> {
    style.child("w:basedOn").and_then(|b| b.attr("w:val"))
}

fn inherit(style: &mut Element, parent: &Element) {
    for container in CONTAINERS {
        let Some(inherited) = parent.child(container) else {
            continue;
        };
        let own = ensure_container(style, container);
        for prop in inherited.elements() {
            match own.child_mut(&prop.name) {
                Some(existing) => {
                    for attr in &prop.attrs {
                        if existing.attr(&attr.key).is_none() {
                            existing.attrs.push(attr.clone());
                        }
                    }
                }
                None => own.push(prop.clone()),
            }
        }
    }
}

/// Get `name` in `style`, inserting it before any later container.
fn ensure_container<'a>(style: &'a mut Element, name: &str) -> &'a mut Element {
    if !style.has_child(name) {
        let rank = CONTAINERS.iter().position(|c| *c == name).unwrap_or(CONTAINERS.len());
        let later: Vec<&str> = CONTAINERS.iter().skip(rank + 1).copied().chain(["w:tblStylePr"]).collect();
        let at = style
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if later.contains(&e.name.as_str())))
            .unwrap_or(style.children.len());
        style.insert(at, Element::new(name));
    }
    style.ensure_child(name)
}
