#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output. A prefix is
//! visibly utilized at an element if:
//! 1. the element's own name uses it (the default namespace counts), or
//! 2. one of the element's attributes uses it, or
//! 3. it appears in the InclusiveNamespaces PrefixList (`#default` names
//!    the default namespace).
//!
//! This is what keeps a signed SAML assertion's digest stable when it is
//! moved between enclosing protocol messages.

use crate::render::{self, Attr, NsDecl, NsMap};
use samlguard_core::Error;
use samlguard_xml::{NodeId, NodeKind, NodeSet, XmlTree};
use std::collections::BTreeSet;

/// Canonicalize a tree using Exclusive C14N 1.0.
pub fn canonicalize(
    tree: &XmlTree,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let inclusive_prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        tree,
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    ctx.process_node(tree.root(), &mut output, &NsMap::new());
    Ok(output)
}

struct ExcC14nContext<'a> {
    tree: &'a XmlTree,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |set| set.contains(id))
    }

    fn process_node(&self, id: NodeId, output: &mut Vec<u8>, rendered_ns: &NsMap) {
        match self.tree.node_kind(id) {
            Some(NodeKind::Document) => {
                for child in self.tree.children(id) {
                    self.process_node(child, output, rendered_ns);
                }
            }
            Some(NodeKind::Element(_)) => self.process_element(id, output, rendered_ns),
            Some(_) if self.is_visible(id) => render::write_leaf(self.tree, id, self.with_comments, output),
            _ => {}
        }
    }

    fn process_element(&self, id: NodeId, output: &mut Vec<u8>, rendered_ns: &NsMap) {
        let Some(element) = self.tree.element(id) else { return };

        if !self.is_visible(id) {
            for child in self.tree.children(id) {
                self.process_node(child, output, rendered_ns);
            }
            return;
        }

        let mut utilized: BTreeSet<String> = self.inclusive_prefixes.clone();
        utilized.insert(element.name.prefix.clone().unwrap_or_default());
        for attr in &element.attributes {
            if let Some(prefix) = &attr.name.prefix {
                utilized.insert(prefix.clone());
            }
        }
        utilized.remove("xml");

        let inscope = render::inscope_namespaces(self.tree, id);
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            match inscope.get(prefix) {
                Some(uri) if rendered_ns.get(prefix) != Some(uri) => {
                    ns_decls.push(NsDecl::new(prefix, uri));
                }
                None if prefix.is_empty() && rendered_ns.get("").is_some_and(|d| !d.is_empty()) => {
                    ns_decls.push(NsDecl::new("", ""));
                }
                _ => {}
            }
        }
        ns_decls.sort();

        let mut attrs = Attr::collect(element);
        attrs.sort();

        let mut child_ns = rendered_ns.clone();
        for decl in &ns_decls {
            child_ns.insert(decl.prefix.clone(), decl.uri.clone());
        }

        let name = element.name.qualified();
        render::write_start_tag(output, &name, &ns_decls, &attrs);
        for child in self.tree.children(id) {
            self.process_node(child, output, &child_ns);
        }
        render::write_end_tag(output, &name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_core::ns;
    use samlguard_xml::SafeXmlLoader;

    fn subtree(xml: &str, ns_uri: &str, local: &str, prefixes: &[String]) -> String {
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        let node = tree.find_element(ns_uri, local).unwrap();
        let set = NodeSet::tree_without_comments(node, &tree);
        String::from_utf8(canonicalize(&tree, false, Some(&set), prefixes).unwrap()).unwrap()
    }

    #[test]
    fn test_only_utilized_namespaces() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:b="urn:b" xmlns="urn:d"><a:x b:attr="1"><y/></a:x></r>"#;
        assert_eq!(
            subtree(xml, "urn:a", "x", &[]),
            r#"<a:x xmlns:a="urn:a" xmlns:b="urn:b" b:attr="1"><y xmlns="urn:d"></y></a:x>"#
        );
    }

    #[test]
    fn test_prefix_list_forces_declaration() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:xs="urn:xs"><a:x/></r>"#;
        assert_eq!(subtree(xml, "urn:a", "x", &[]), r#"<a:x xmlns:a="urn:a"></a:x>"#);
        assert_eq!(
            subtree(xml, "urn:a", "x", &["xs".to_owned()]),
            r#"<a:x xmlns:a="urn:a" xmlns:xs="urn:xs"></a:x>"#
        );
    }

    #[test]
    fn test_default_namespace_reset() {
        let xml = r#"<r xmlns="urn:d"><c xmlns=""/></r>"#;
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        let out = String::from_utf8(canonicalize(&tree, false, None, &[]).unwrap()).unwrap();
        assert_eq!(out, r#"<r xmlns="urn:d"><c xmlns=""></c></r>"#);
    }

    #[test]
    fn test_enclosing_context_does_not_leak() {
        let a = r#"<p:Outer xmlns:p="urn:p" xmlns:q="urn:q"><p:In ID="1">v</p:In></p:Outer>"#;
        let b = r#"<o:Other xmlns:o="urn:o"><x:In xmlns:x="urn:p" ID="1">v</x:In></o:Other>"#;
        let first = subtree(a, "urn:p", "In", &[]);
        let second = subtree(b, "urn:p", "In", &[]);
        assert_eq!(first, r#"<p:In xmlns:p="urn:p" ID="1">v</p:In>"#);
        assert_eq!(second, r#"<x:In xmlns:x="urn:p" ID="1">v</x:In>"#);
    }

    #[test]
    fn test_signed_assertion_minus_signature() {
        let xml = include_str!("../../samlguard/tests/data/response-signed-assertion.xml");
        let tree = SafeXmlLoader::new().parse(xml).unwrap();
        let assertion = tree.find_element(ns::SAML, "Assertion").unwrap();
        let signature = tree.find_element(ns::DSIG, "Signature").unwrap();
        let mut set = NodeSet::tree_without_comments(assertion, &tree);
        set.remove_subtree(signature, &tree);
        let out = String::from_utf8(canonicalize(&tree, false, Some(&set), &[]).unwrap()).unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_assert1" IssueInstant="2024-01-01T00:00:00Z" Version="2.0">"#,
                r#"<saml:Issuer>https://idp.example.test</saml:Issuer>"#,
                r#"<saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">alice@example.test</saml:NameID></saml:Subject>"#,
                r#"</saml:Assertion>"#
            )
        );
    }
}
