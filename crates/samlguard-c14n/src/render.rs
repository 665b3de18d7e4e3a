#![forbid(unsafe_code)]

//! Shared rendering pieces for both canonicalization variants.

use samlguard_core::ns;
use samlguard_xml::escape;
use samlguard_xml::{Element, NodeId, NodeKind, XmlTree};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Prefix to URI bindings, keyed by prefix ("" is the default namespace).
pub type NsMap = BTreeMap<String, String>;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        out.extend_from_slice(escape::escape_attr(&self.uri).as_bytes());
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    // Default namespace first, then by prefix.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// "" for no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    /// Collect the attributes of `element`, unsorted.
    pub fn collect(element: &Element) -> Vec<Attr> {
        element
            .attributes
            .iter()
            .map(|a| Attr {
                ns_uri: a.name.namespace_uri.clone().unwrap_or_default(),
                local_name: a.name.local_name.clone(),
                qualified_name: a.name.qualified(),
                value: a.value.clone(),
            })
            .collect()
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape::escape_attr(&self.value).as_bytes());
        out.push(b'"');
    }
}

impl Ord for Attr {
    // Unqualified attributes first by local name, then by (URI, local name).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => (&self.ns_uri, &self.local_name).cmp(&(&other.ns_uri, &other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Write `<name decls attrs>`. Both slices must already be sorted.
pub fn write_start_tag(out: &mut Vec<u8>, name: &str, decls: &[NsDecl], attrs: &[Attr]) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for decl in decls {
        decl.write(out);
    }
    for attr in attrs {
        attr.write(out);
    }
    out.push(b'>');
}

pub fn write_end_tag(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(b"</");
    out.extend_from_slice(name.as_bytes());
    out.push(b'>');
}

/// Render a text, comment or processing-instruction node.
///
/// Comments and PIs that are children of the document node get a line
/// break on the side facing the document element.
pub fn write_leaf(tree: &XmlTree, id: NodeId, with_comments: bool, out: &mut Vec<u8>) {
    match tree.node_kind(id) {
        Some(NodeKind::Text(text)) => {
            out.extend_from_slice(escape::escape_text(text).as_bytes());
        }
        Some(NodeKind::Comment(text)) if with_comments => {
            let (before, after) = document_level_breaks(tree, id);
            if before {
                out.push(b'\n');
            }
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"-->");
            if after {
                out.push(b'\n');
            }
        }
        Some(NodeKind::ProcessingInstruction(pi)) => {
            let (before, after) = document_level_breaks(tree, id);
            if before {
                out.push(b'\n');
            }
            out.extend_from_slice(b"<?");
            out.extend_from_slice(pi.target.as_bytes());
            if let Some(data) = pi.data.as_deref().filter(|d| !d.is_empty()) {
                out.push(b' ');
                out.extend_from_slice(escape::escape_pi(data).as_bytes());
            }
            out.extend_from_slice(b"?>");
            if after {
                out.push(b'\n');
            }
        }
        _ => {}
    }
}

fn document_level_breaks(tree: &XmlTree, id: NodeId) -> (bool, bool) {
    let at_document_level = tree
        .parent(id)
        .is_some_and(|p| matches!(tree.node_kind(p), Some(NodeKind::Document)));
    if !at_document_level {
        return (false, false);
    }
    let mut before = false;
    let mut sib = tree.previous_sibling(id);
    while let Some(s) = sib {
        before |= tree.element(s).is_some();
        sib = tree.previous_sibling(s);
    }
    let mut after = false;
    let mut sib = tree.next_sibling(id);
    while let Some(s) = sib {
        after |= tree.element(s).is_some();
        sib = tree.next_sibling(s);
    }
    (before, after)
}

/// All namespace bindings in scope at `id`, nearest declaration winning.
///
/// An empty URI undeclares the default namespace, so it drops out of the
/// map. The implicit `xml` binding is never included.
pub fn inscope_namespaces(tree: &XmlTree, id: NodeId) -> NsMap {
    let mut chain = Vec::new();
    let mut current = Some(id);
    while let Some(n) = current {
        if tree.element(n).is_some() {
            chain.push(n);
        }
        current = tree.parent(n);
    }

    let mut result = NsMap::new();
    for n in chain.into_iter().rev() {
        let Some(element) = tree.element(n) else { continue };
        for decl in &element.namespace_declarations {
            if decl.uri.is_empty() {
                result.remove(&decl.prefix);
            } else {
                result.insert(decl.prefix.clone(), decl.uri.clone());
            }
        }
    }
    result.remove("xml");
    result
}

/// `xml:*` attributes of the ancestors of `id`, nearest value winning.
pub fn inherited_xml_attrs(tree: &XmlTree, id: NodeId) -> Vec<Attr> {
    let mut found: BTreeMap<String, String> = BTreeMap::new();
    let mut current = tree.parent(id);
    while let Some(ancestor) = current {
        if let Some(element) = tree.element(ancestor) {
            for attr in &element.attributes {
                if attr.name.namespace_uri.as_deref() == Some(ns::XML) {
                    found
                        .entry(attr.name.local_name.clone())
                        .or_insert_with(|| attr.value.clone());
                }
            }
        }
        current = tree.parent(ancestor);
    }
    found
        .into_iter()
        .map(|(local_name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            qualified_name: format!("xml:{local_name}"),
            local_name,
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_decl_order() {
        let mut decls = vec![NsDecl::new("b", "urn:b"), NsDecl::new("", "urn:d"), NsDecl::new("a", "urn:a")];
        decls.sort();
        let prefixes: Vec<_> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, ["", "a", "b"]);
    }

    #[test]
    fn test_attr_order() {
        let attr = |ns: &str, local: &str| Attr {
            ns_uri: ns.into(),
            local_name: local.into(),
            qualified_name: local.into(),
            value: String::new(),
        };
        let mut attrs = vec![attr("urn:b", "a"), attr("", "z"), attr("urn:a", "z"), attr("", "b")];
        attrs.sort();
        let order: Vec<_> = attrs.iter().map(|a| (a.ns_uri.as_str(), a.local_name.as_str())).collect();
        assert_eq!(order, [("", "b"), ("", "z"), ("urn:a", "z"), ("urn:b", "a")]);
    }
}
