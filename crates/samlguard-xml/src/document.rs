#![forbid(unsafe_code)]

//! Owned, immutable XML tree.
//!
//! Nodes live in an arena indexed by [`NodeId`]. The tree is produced by
//! [`crate::SafeXmlLoader`] and has no public mutation API; code that needs
//! a different tree parses a new one.

use samlguard_core::ns;

/// Index of a node inside one [`XmlTree`].
///
/// Ids are only meaningful for the tree that handed them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A namespace-resolved name as written in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    /// The lexical prefix, if any.
    pub prefix: Option<String>,
    pub local_name: String,
    /// The namespace URI the prefix resolved to at parse time.
    pub namespace_uri: Option<String>,
}

impl QName {
    /// Does this name have the given namespace URI and local name?
    pub fn is(&self, namespace_uri: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace_uri.as_deref().unwrap_or("") == namespace_uri
    }

    /// `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// A namespace declaration carried by an element (`xmlns` / `xmlns:p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// "" for the default namespace.
    pub prefix: String,
    /// "" for an undeclaration (`xmlns=""`).
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespace_declarations: Vec<NamespaceDecl>,
}

impl Element {
    /// Value of an attribute without a namespace.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace_uri.is_none() && a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespaced attribute.
    pub fn attribute_ns(&self, namespace_uri: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace_uri, local_name) && a.name.namespace_uri.is_some())
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction(ProcessingInstruction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlTree {
    nodes: Vec<NodeData>,
    document_element: NodeId,
}

impl XmlTree {
    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element.
    pub fn document_element(&self) -> NodeId {
        self.document_element
    }

    /// Number of nodes, the document node included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node_kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.node_kind(id) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(move |c| self.element(*c).is_some())
    }

    /// Element children with the given namespace and local name.
    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        namespace_uri: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.element_children(id).filter(move |c| {
            self.element(*c)
                .is_some_and(|e| e.name.is(namespace_uri, local_name))
        })
    }

    /// First element child with the given namespace and local name.
    pub fn child_element(&self, id: NodeId, namespace_uri: &str, local_name: &str) -> Option<NodeId> {
        self.child_elements(id, namespace_uri, local_name).next()
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        Descendants { tree: self, stack }
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = &self.nodes[parent.0].children;
        let pos = siblings.iter().position(|s| *s == id)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = &self.nodes[parent.0].children;
        let pos = siblings.iter().position(|s| *s == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Is `ancestor` an ancestor-or-self of `node`?
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Number of element ancestors above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(n) = current {
            if self.element(n).is_some() {
                depth += 1;
            }
            current = self.parent(n);
        }
        depth
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeKind::Text(t)) = self.node_kind(id) {
            out.push_str(t);
        }
        for d in self.descendants(id) {
            if let Some(NodeKind::Text(t)) = self.node_kind(d) {
                out.push_str(t);
            }
        }
        out
    }

    /// Find the first descendant element with the given namespace and local name.
    pub fn find_element(&self, namespace_uri: &str, local_name: &str) -> Option<NodeId> {
        self.find_elements(namespace_uri, local_name).into_iter().next()
    }

    /// Find all descendant elements with the given namespace and local name.
    pub fn find_elements(&self, namespace_uri: &str, local_name: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|id| {
                self.element(*id)
                    .is_some_and(|e| e.name.is(namespace_uri, local_name))
            })
            .collect()
    }

    /// Is `id` an element named `local_name` in the XML-DSig namespace?
    pub fn is_dsig_element(&self, id: NodeId, local_name: &str) -> bool {
        self.element(id).is_some_and(|e| e.name.is(ns::DSIG, local_name))
    }
}

/// Pre-order iterator returned by [`XmlTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a XmlTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = &self.tree.nodes[id.0].children;
        self.stack.extend(children.iter().rev().copied());
        Some(id)
    }
}

/// Incremental tree construction used by the loader.
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    nodes: Vec<NodeData>,
    open: Vec<NodeId>,
    document_element: Option<NodeId>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            open: vec![NodeId(0)],
            document_element: None,
        }
    }

    /// Number of currently open elements.
    pub(crate) fn depth(&self) -> usize {
        self.open.len() - 1
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn has_document_element(&self) -> bool {
        self.document_element.is_some()
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(NodeId(0))
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn open_element(&mut self, element: Element) -> NodeId {
        let at_top = self.depth() == 0;
        let id = self.append(NodeKind::Element(element));
        if at_top && self.document_element.is_none() {
            self.document_element = Some(id);
        }
        self.open.push(id);
        id
    }

    pub(crate) fn close_element(&mut self) {
        if self.open.len() > 1 {
            self.open.pop();
        }
    }

    /// Append text, merging with a directly preceding text node.
    pub(crate) fn text(&mut self, text: &str) {
        let parent = self.current();
        if let Some(last) = self.nodes[parent.0].children.last().copied() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.append(NodeKind::Text(text.to_owned()));
    }

    pub(crate) fn comment(&mut self, text: &str) {
        self.append(NodeKind::Comment(text.to_owned()));
    }

    pub(crate) fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        self.append(NodeKind::ProcessingInstruction(ProcessingInstruction {
            target: target.to_owned(),
            data: data.map(str::to_owned),
        }));
    }

    /// Finish the tree. `None` when no element was ever opened.
    pub(crate) fn finish(self) -> Option<XmlTree> {
        let document_element = self.document_element?;
        Some(XmlTree {
            nodes: self.nodes,
            document_element,
        })
    }
}
