//! Minimal mutable XML tree over `quick-xml` events.
//!
//! Parsing keeps the raw source text of everything that is not an element
//! (text, comments, processing instructions, the declaration, CDATA), so a
//! parse → serialize round-trip without edits reproduces the input exactly.
//! Attribute values are stored unescaped. An attribute keeps its source text
//! until it is edited, so only edited values are re-escaped on output.
//!
//! Element names are qualified names as written (`w:rPr`). WordprocessingML
//! producers use the conventional prefixes, which is what the rewriting
//! phases match on.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML near byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("unbalanced element structure")]
    Unbalanced,

    #[error("invalid UTF-8 in element or attribute name")]
    Utf8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped exactly as in the source.
    Text(String),
    /// Declaration, comment, PI, CDATA or doctype, verbatim.
    Raw(String),
}

/// One attribute. `raw` is the escaped source text, dropped on edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: String,
    raw: Option<String>,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            raw: None,
        }
    }

    fn write(&self, out: &mut String) {
        out.push(' ');
        out.push_str(&self.key);
        match &self.raw {
            // a double quote can only appear unescaped inside single quotes
            Some(raw) if raw.contains('"') => {
                out.push_str("='");
                out.push_str(raw);
                out.push('\'');
            }
            Some(raw) => {
                out.push_str("=\"");
                out.push_str(raw);
                out.push('"');
            }
            None => {
                out.push_str("=\"");
                out.push_str(&quick_xml::escape::escape(self.value.as_str()));
                out.push('"');
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    /// Written as `<x/>` when it still has no children.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: true,
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Set `key` to `value`. Returns `true` when the stored value changed.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.key == key) {
            Some(a) if a.value == value => false,
            Some(a) => {
                a.value = value;
                a.raw = None;
                true
            }
            None => {
                self.attrs.push(Attr::new(key, value));
                true
            }
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|a| a.key == key)?;
        Some(self.attrs.remove(idx).value)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn insert(&mut self, index: usize, child: Element) {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(child));
    }

    /// Get the child `name`, creating an empty one at the end if missing.
    pub fn ensure_child(&mut self, name: &str) -> &mut Element {
        let idx = match self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.name == name))
        {
            Some(idx) => idx,
            None => {
                self.children.push(Node::Element(Element::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[idx] {
            Node::Element(e) => e,
            // position() above only matches elements
            _ => unreachable!(),
        }
    }

    /// Remove every direct child element whose name is in `names`.
    /// Returns how many were removed.
    pub fn remove_children(&mut self, names: &[&str]) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if names.contains(&e.name.as_str())));
        before - self.children.len()
    }

    /// Pre-order traversal: `f` sees an element before its children.
    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    pub fn walk<F: FnMut(&Element)>(&self, f: &mut F) {
        f(self);
        for child in self.elements() {
            child.walk(f);
        }
    }

    /// Unescaped text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attrs {
            attr.write(out);
        }
        if self.self_closing && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(raw) => out.push_str(&unescape_lossy(raw)),
            Node::Element(e) => collect_text(e, out),
            Node::Raw(_) => {}
        }
    }
}

fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

impl Node {
    fn write(&self, out: &mut String) {
        match self {
            Node::Element(e) => e.write(out),
            Node::Text(raw) | Node::Raw(raw) => out.push_str(raw),
        }
    }

    /// Escaped text node.
    pub fn text(s: &str) -> Self {
        Node::Text(quick_xml::escape::escape(s).into_owned())
    }
}

/// A parsed XML part.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<Element> = Vec::new();
        let mut top: Vec<Node> = Vec::new();
        let mut pos = reader.buffer_position();

        loop {
            let event = reader.read_event().map_err(|e| XmlError::Parse {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;
            let end = reader.buffer_position();
            let raw = input.get(pos..end).unwrap_or_default();
            pos = end;

            let node = match event {
                Event::Start(e) => {
                    stack.push(element_from(&e, false)?);
                    continue;
                }
                Event::Empty(e) => Node::Element(element_from(&e, true)?),
                Event::End(_) => Node::Element(stack.pop().ok_or(XmlError::Unbalanced)?),
                Event::Text(_) => Node::Text(raw.to_string()),
                Event::Eof => break,
                _ => Node::Raw(raw.to_string()),
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Unbalanced);
        }
        Ok(Self { nodes: top })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write(&mut out);
        }
        out
    }
}

fn element_from(e: &BytesStart<'_>, self_closing: bool) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|_| XmlError::Utf8)?
        .to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Parse {
            position: 0,
            message: err.to_string(),
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| XmlError::Utf8)?
            .to_string();
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|_| XmlError::Utf8)?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Parse {
                position: 0,
                message: err.to_string(),
            })?
            .into_owned();
        attrs.push(Attr {
            key,
            value,
            raw: Some(raw),
        });
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        self_closing,
    })
}
