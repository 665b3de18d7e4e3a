#![forbid(unsafe_code)]

//! XML output: a streaming writer for building documents and a tree
//! serializer.

use crate::document::{NodeId, NodeKind, XmlTree};
use crate::escape::{escape_attr, escape_text};
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use samlguard_core::Error;
use std::collections::HashMap;

fn write_error(e: impl std::fmt::Display) -> Error {
    Error::XmlStructure(format!("XML write failed: {e}"))
}

/// A simple XML writer wrapping quick-xml's `Writer`.
pub struct XmlWriter {
    writer: quick_xml::Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self {
            writer: quick_xml::Writer::new(Vec::new()),
        }
    }

    /// Write the XML declaration.
    pub fn write_declaration(&mut self) -> Result<(), Error> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        self.write(Event::Start(start_tag(name, attrs)))
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        self.write(Event::Empty(start_tag(name, attrs)))
    }

    /// End the current element.
    pub fn end_element(&mut self, name: &str) -> Result<(), Error> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Write text content.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.write(Event::Text(BytesText::from_escaped(escape_text(text))))
    }

    /// Write a complete element containing only text.
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), Error> {
        self.start_element(name, attrs)?;
        self.write_text(text)?;
        self.end_element(name)
    }

    /// Write pre-formed markup as is.
    pub fn write_raw(&mut self, markup: &str) -> Result<(), Error> {
        self.write(Event::Text(BytesText::from_escaped(markup)))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.writer.write_event(event).map_err(write_error)
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.into_bytes()).map_err(write_error)
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw start-tag content with our own escaping, so values round-trip
/// exactly through the loader.
fn start_tag(name: &str, attrs: &[(&str, &str)]) -> BytesStart<'static> {
    let mut content = name.to_owned();
    for (key, value) in attrs {
        content.push(' ');
        content.push_str(key);
        content.push_str("=\"");
        content.push_str(&escape_attr(value));
        content.push('"');
    }
    BytesStart::from_content(content, name.len())
}

/// Changes applied while serializing a tree.
///
/// Trees are immutable, so filling in a signature template or placing a
/// new signature happens on the way out, followed by a fresh parse.
#[derive(Debug, Clone, Default)]
pub struct Edits {
    /// Replace the content of an element with this text.
    pub replace_text: HashMap<NodeId, String>,
    /// Raw markup written as the first content of an element.
    pub insert_first: HashMap<NodeId, String>,
    /// Raw markup written right after a node.
    pub insert_after: HashMap<NodeId, String>,
}

impl Edits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_text(mut self, id: NodeId, text: impl Into<String>) -> Self {
        self.replace_text.insert(id, text.into());
        self
    }

    pub fn insert_first(mut self, id: NodeId, markup: impl Into<String>) -> Self {
        self.insert_first.insert(id, markup.into());
        self
    }

    pub fn insert_after(mut self, id: NodeId, markup: impl Into<String>) -> Self {
        self.insert_after.insert(id, markup.into());
        self
    }
}

/// Serialize a tree. The output re-parses to an equal tree.
pub fn serialize(tree: &XmlTree) -> Result<String, Error> {
    serialize_with(tree, &Edits::default())
}

/// Serialize a tree with edits applied.
pub fn serialize_with(tree: &XmlTree, edits: &Edits) -> Result<String, Error> {
    let mut out = XmlWriter::new();
    for child in tree.children(tree.root()) {
        write_node(tree, child, edits, &mut out)?;
    }
    out.into_string()
}

fn write_node(tree: &XmlTree, id: NodeId, edits: &Edits, out: &mut XmlWriter) -> Result<(), Error> {
    match tree.node_kind(id) {
        Some(NodeKind::Element(element)) => {
            let name = element.name.qualified();
            let mut attrs: Vec<(String, String)> = element
                .namespace_declarations
                .iter()
                .map(|d| {
                    let key = if d.prefix.is_empty() {
                        "xmlns".to_owned()
                    } else {
                        format!("xmlns:{}", d.prefix)
                    };
                    (key, d.uri.clone())
                })
                .collect();
            attrs.extend(
                element
                    .attributes
                    .iter()
                    .map(|a| (a.name.qualified(), a.value.clone())),
            );
            let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

            let first = edits.insert_first.get(&id);
            if let Some(text) = edits.replace_text.get(&id) {
                out.text_element(&name, &attrs, text)?;
            } else if first.is_none() && tree.children(id).next().is_none() {
                out.empty_element(&name, &attrs)?;
            } else {
                out.start_element(&name, &attrs)?;
                if let Some(markup) = first {
                    out.write_raw(markup)?;
                }
                for child in tree.children(id) {
                    write_node(tree, child, edits, out)?;
                }
                out.end_element(&name)?;
            }
        }
        Some(NodeKind::Text(text)) => out.write_text(text)?,
        Some(NodeKind::Comment(text)) => out.write(Event::Comment(BytesText::from_escaped(text.as_str())))?,
        Some(NodeKind::ProcessingInstruction(pi)) => {
            let content = match &pi.data {
                Some(data) => format!("{} {}", pi.target, data),
                None => pi.target.clone(),
            };
            out.write(Event::PI(BytesPI::new(content)))?;
        }
        Some(NodeKind::Document) | None => {}
    }
    if let Some(markup) = edits.insert_after.get(&id) {
        out.write_raw(markup)?;
    }
    Ok(())
}

impl XmlTree {
    /// Serialize this tree to XML text (without an XML declaration).
    pub fn to_xml_string(&self) -> Result<String, Error> {
        serialize(self)
    }
}
