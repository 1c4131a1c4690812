//! Minimal XML document tree.
//!
//! The radiko directories and schedules are walked by tag name rather than
//! mapped onto fixed structs, so the parser keeps a small owned tree that
//! callers can query with `elements_by_tag`, `attr` and `text`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

/// A parsed document. The root is a synthetic `#document` element holding
/// the top-level nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack = vec![Element::new("#document")];

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let el = Element::from_start(&e)?;
                    attach(&mut stack, Node::Element(el));
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        if let Some(el) = stack.pop() {
                            attach(&mut stack, Node::Element(el));
                        }
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?.into_owned();
                    attach(&mut stack, Node::Text(text));
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    attach(&mut stack, Node::Text(text));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        // Unterminated elements still belong to the tree.
        while stack.len() > 1 {
            if let Some(el) = stack.pop() {
                attach(&mut stack, Node::Element(el));
            }
        }

        let root = stack.pop().unwrap_or_else(|| Element::new("#document"));
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<&Element> {
        self.root.elements_by_tag(tag)
    }
}

fn attach(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let mut el = Self::new(&String::from_utf8_lossy(e.name().as_ref()));
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            el.attrs.push((key, value));
        }
        Ok(el)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value, or `""` when absent.
    pub fn attr(&self, name: &str) -> &str {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == name)
    }

    /// Direct child elements.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// This element and all descendants named `tag`, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_by_tag(tag, &mut out);
        out
    }

    fn collect_by_tag<'a>(&'a self, tag: &str, out: &mut Vec<&'a Element>) {
        if self.name == tag {
            out.push(self);
        }
        for child in self.children() {
            child.collect_by_tag(tag, out);
        }
    }

    pub fn first_by_tag(&self, tag: &str) -> Option<&Element> {
        if self.name == tag {
            return Some(self);
        }
        self.children().find_map(|c| c.first_by_tag(tag))
    }

    /// Text of the first descendant named `tag`, or `""`.
    pub fn text_of(&self, tag: &str) -> String {
        self.first_by_tag(tag).map(|e| e.text()).unwrap_or_default()
    }

    /// All descendant text with whitespace runs collapsed and trimmed.
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        normalize_whitespace(&raw)
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
