#![forbid(unsafe_code)]

//! URI resolution for XML-DSig references.
//!
//! Handles:
//! - Empty URI (`""`): the whole document minus comments
//! - Same-document references (`#id`, `#xpointer(id('id'))`): the element
//!   subtree minus comments
//!
//! Anything else (external documents, other XPointer forms) is refused;
//! the verifier never fetches anything.

use samlguard_core::{redact, Error};
use samlguard_xml::{xpath, NodeId, NodeSet, XmlTree};
use std::collections::HashMap;

/// What a reference URI points at.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    /// The document node for `""`, otherwise the referenced element.
    pub target: NodeId,
    pub node_set: NodeSet,
}

/// Resolve a reference URI against a tree.
pub fn resolve_reference(
    uri: &str,
    tree: &XmlTree,
    id_map: &HashMap<String, NodeId>,
) -> Result<ResolvedReference, Error> {
    if uri.is_empty() {
        return Ok(ResolvedReference {
            target: tree.root(),
            node_set: NodeSet::all_without_comments(tree),
        });
    }
    let Some(id) = xpath::parse_same_document_ref(uri) else {
        return Err(Error::InvalidUri(format!(
            "only same-document references are supported: {}",
            redact::quote(uri)
        )));
    };
    let target = xpath::resolve_id(id_map, id)?;
    Ok(ResolvedReference {
        target,
        node_set: NodeSet::tree_without_comments(target, tree),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_xml::SafeXmlLoader;

    fn tree_and_ids() -> (XmlTree, HashMap<String, NodeId>) {
        let tree = SafeXmlLoader::new()
            .parse("<r><!--c--><a ID=\"x\"><!--inner--><b/></a></r>")
            .unwrap();
        let ids = xpath::build_id_map(&tree, &["ID".to_owned()]).unwrap();
        (tree, ids)
    }

    #[test]
    fn test_empty_uri_is_whole_document() {
        let (tree, ids) = tree_and_ids();
        let resolved = resolve_reference("", &tree, &ids).unwrap();
        assert_eq!(resolved.target, tree.root());
        assert!(resolved.node_set.contains(tree.document_element()));
    }

    #[test]
    fn test_id_reference() {
        let (tree, ids) = tree_and_ids();
        let a = ids["x"];
        for uri in ["#x", "#xpointer(id('x'))"] {
            let resolved = resolve_reference(uri, &tree, &ids).unwrap();
            assert_eq!(resolved.target, a);
            assert!(!resolved.node_set.contains(tree.document_element()));
            // Element, comment-free subtree.
            assert_eq!(resolved.node_set.len(), 2);
        }
    }

    #[test]
    fn test_external_and_unknown() {
        let (tree, ids) = tree_and_ids();
        assert!(matches!(
            resolve_reference("http://evil.example/doc.xml", &tree, &ids),
            Err(Error::InvalidUri(_))
        ));
        assert!(matches!(resolve_reference("#missing", &tree, &ids), Err(Error::InvalidUri(_))));
    }
}
