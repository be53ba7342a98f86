//! Minimal mutable XML element tree
//!
//! Parsed from quick-xml events and written back through `quick_xml::Writer`. Only
//! what the builders and the template populator need: elements, attributes, text and
//! the resolved namespace of each element. Comments, processing instructions and
//! whitespace-only text are dropped on parse.

use std::io::Write;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};

use crate::error::XmlError;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified name as written, prefix included
    pub name: String,
    /// Namespace URI the name resolved to when parsed
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element and hand it back for further filling.
    pub fn push_element(&mut self, child: Element) -> &mut Element {
        self.children.push(XmlNode::Element(child));
        match self.children.last_mut() {
            Some(XmlNode::Element(el)) => el,
            _ => unreachable!("element was just pushed"),
        }
    }

    /// Replace all direct text content. Child elements are kept.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.retain(|node| matches!(node, XmlNode::Element(_)));
        if !text.is_empty() {
            self.children.insert(0, XmlNode::Text(text));
        }
    }

    /// Direct text content, concatenated.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.local_name() == local_name => Some(el),
            _ => None,
        })
    }

    /// Depth-first search below this element (the element itself excluded).
    pub fn find<P>(&self, pred: P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        for el in self.elements() {
            if pred(el) {
                return Some(el);
            }
            if let Some(found) = el.find(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Child-index path to the first descendant matching `pred`.
    pub fn find_path<P>(&self, pred: P) -> Option<Vec<usize>>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        for (i, node) in self.children.iter().enumerate() {
            let XmlNode::Element(el) = node else {
                continue;
            };
            if pred(el) {
                return Some(vec![i]);
            }
            if let Some(mut path) = el.find_path(pred) {
                path.insert(0, i);
                return Some(path);
            }
        }
        None
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &i in path {
            current = match current.children.get_mut(i)? {
                XmlNode::Element(el) => el,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    pub fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write(writer)?,
                XmlNode::Text(text) => {
                    let escaped = partial_escape(text);
                    writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Compact serialization with an optional declaration, no whitespace added.
    pub fn to_compact_string(&self, encoding: Option<&str>) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        if let Some(encoding) = encoding {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some(encoding), None)))?;
        }
        self.write(&mut writer)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Serialization with one element per line, children indented by `indent` spaces.
    /// Elements holding only text stay on one line.
    pub fn to_indented_string(&self, indent: usize) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
        self.write(&mut writer)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_resolved_event_into(&mut buf)? {
            (ns, Event::Start(e)) => {
                stack.push(element_from_start(ns, &e)?);
            }
            (ns, Event::Empty(e)) => {
                let el = element_from_start(ns, &e)?;
                attach(&mut stack, &mut root, el)?;
            }
            (_, Event::End(e)) => {
                let found = String::from_utf8(e.name().as_ref().to_vec())?;
                let el = stack.pop().ok_or_else(|| XmlError::UnbalancedTag {
                    expected: String::new(),
                    found: found.clone(),
                })?;
                if el.name != found {
                    return Err(XmlError::UnbalancedTag {
                        expected: el.name,
                        found,
                    });
                }
                attach(&mut stack, &mut root, el)?;
            }
            (_, Event::Text(e)) => {
                let text = e.unescape()?.into_owned();
                push_text(&mut stack, text);
            }
            (_, Event::CData(e)) => {
                let text = String::from_utf8(e.into_inner().into_owned())?;
                push_text(&mut stack, text);
            }
            (_, Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::UnclosedTag(open.name));
    }
    root.ok_or(XmlError::NoRootElement)
}

fn element_from_start(ns: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let mut el = Element::new(String::from_utf8(start.name().as_ref().to_vec())?);
    el.namespace = match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    };
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())?;
        let value = attr.unescape_value()?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(el));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(XmlError::MultipleRoots(el.name)),
    }
}

fn push_text(stack: &mut [Element], text: String) {
    if text.trim().is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match parent.children.last_mut() {
            Some(XmlNode::Text(existing)) => existing.push_str(&text),
            _ => parent.children.push(XmlNode::Text(text)),
        }
    }
}
