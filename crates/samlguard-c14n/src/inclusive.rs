#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every namespace in scope at an output element is rendered unless the
//! nearest output ancestor already rendered the same binding. For document
//! subsets, `xml:*` attributes of omitted ancestors are pulled down onto
//! the apex element.

use crate::render::{self, Attr, NsDecl, NsMap};
use samlguard_core::Error;
use samlguard_xml::{NodeId, NodeKind, NodeSet, XmlTree};

/// Canonicalize a tree using Inclusive C14N 1.0.
pub fn canonicalize(
    tree: &XmlTree,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        tree,
        with_comments,
        node_set,
    };
    ctx.process_node(tree.root(), &mut output, &NsMap::new());
    Ok(output)
}

struct C14nContext<'a> {
    tree: &'a XmlTree,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |set| set.contains(id))
    }

    fn process_node(&self, id: NodeId, output: &mut Vec<u8>, inherited_ns: &NsMap) {
        match self.tree.node_kind(id) {
            Some(NodeKind::Document) => {
                for child in self.tree.children(id) {
                    self.process_node(child, output, inherited_ns);
                }
            }
            Some(NodeKind::Element(_)) => self.process_element(id, output, inherited_ns),
            Some(_) if self.is_visible(id) => render::write_leaf(self.tree, id, self.with_comments, output),
            _ => {}
        }
    }

    fn process_element(&self, id: NodeId, output: &mut Vec<u8>, inherited_ns: &NsMap) {
        let Some(element) = self.tree.element(id) else { return };

        if !self.is_visible(id) {
            // Descendants still measure against the nearest output ancestor.
            for child in self.tree.children(id) {
                self.process_node(child, output, inherited_ns);
            }
            return;
        }

        let inscope = render::inscope_namespaces(self.tree, id);
        let mut ns_decls: Vec<NsDecl> = inscope
            .iter()
            .filter(|(prefix, uri)| inherited_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl::new(prefix, uri))
            .collect();

        // The output ancestor had a default namespace that is not in scope here.
        let mut child_ns = inherited_ns.clone();
        if !inscope.contains_key("") && inherited_ns.get("").is_some_and(|d| !d.is_empty()) {
            ns_decls.push(NsDecl::new("", ""));
            child_ns.insert(String::new(), String::new());
        }
        ns_decls.sort();
        child_ns.extend(inscope);

        let mut attrs = Attr::collect(element);
        if self.node_set.is_some() && self.parent_omitted(id) {
            let extra: Vec<Attr> = render::inherited_xml_attrs(self.tree, id)
                .into_iter()
                .filter(|x| !attrs.iter().any(|a| a.ns_uri == x.ns_uri && a.local_name == x.local_name))
                .collect();
            attrs.extend(extra);
        }
        attrs.sort();

        let name = element.name.qualified();
        render::write_start_tag(output, &name, &ns_decls, &attrs);
        for child in self.tree.children(id) {
            self.process_node(child, output, &child_ns);
        }
        render::write_end_tag(output, &name);
    }

    fn parent_omitted(&self, id: NodeId) -> bool {
        self.tree
            .parent(id)
            .map_or(true, |p| self.tree.element(p).is_none() || !self.is_visible(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_xml::SafeXmlLoader;

    fn c14n(xml: &str) -> String {
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        String::from_utf8(canonicalize(&tree, false, None).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn test_namespace_rendering() {
        assert_eq!(
            c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:child xmlns:b="http://b"/></root>"#),
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c &gt; d</root>"),
            "<root>a &amp; b &lt; c &gt; d</root>"
        );
    }

    #[test]
    fn test_default_namespace_undeclared() {
        assert_eq!(
            c14n(r#"<r xmlns="urn:d"><c xmlns=""><g/></c></r>"#),
            r#"<r xmlns="urn:d"><c xmlns=""><g></g></c></r>"#
        );
    }

    #[test]
    fn test_document_level_comments_and_pis() {
        let xml = "<?pi a?><!--before--><r/><!--after-->";
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        let with = String::from_utf8(canonicalize(&tree, true, None).unwrap()).unwrap();
        assert_eq!(with, "<?pi a?>\n<!--before-->\n<r></r>\n<!--after-->");
        let without = String::from_utf8(canonicalize(&tree, false, None).unwrap()).unwrap();
        assert_eq!(without, "<?pi a?>\n<r></r>");
    }

    #[test]
    fn test_subset_pulls_in_xml_attributes() {
        let xml = r#"<r xml:lang="en" xmlns:p="urn:p"><p:a xml:space="preserve"><b/></p:a></r>"#;
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        let b = tree.find_elements("", "b")[0];
        let set = NodeSet::tree_without_comments(b, &tree);
        let out = String::from_utf8(canonicalize(&tree, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<b xmlns:p="urn:p" xml:lang="en" xml:space="preserve"></b>"#
        );
    }
}
