#![forbid(unsafe_code)]

//! Same-document reference resolution for XML-DSig.
//!
//! Only the reference forms signature processing needs:
//! - `""`: the whole document
//! - `#id`: the element carrying that ID value
//! - `#xpointer(id('id'))`: same as `#id`
//!
//! ID lookup is strict. An ID value that appears on more than one element
//! is an error, so a reference can never be satisfied by a decoy copy.

use crate::document::{NodeId, XmlTree};
use samlguard_core::redact::quote;
use samlguard_core::Error;
use std::collections::HashMap;

/// Attribute names treated as IDs when none are configured.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["ID", "Id", "id"];

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    let fragment = uri.strip_prefix('#')?;
    Some(parse_xpointer_id(fragment).unwrap_or(fragment))
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Build the ID value → element map, rejecting duplicate values.
pub fn build_id_map(tree: &XmlTree, id_attrs: &[String]) -> Result<HashMap<String, NodeId>, Error> {
    let mut map: HashMap<String, NodeId> = HashMap::new();
    for id in tree.descendants(tree.root()) {
        let Some(element) = tree.element(id) else {
            continue;
        };
        for attr_name in id_attrs {
            let Some(value) = element.attribute(attr_name) else {
                continue;
            };
            match map.get(value) {
                Some(existing) if *existing != id => {
                    return Err(Error::DuplicateId(quote(value)));
                }
                Some(_) => {}
                None => {
                    map.insert(value.to_owned(), id);
                }
            }
        }
    }
    Ok(map)
}

/// Resolve an ID value using a pre-built ID map.
pub fn resolve_id(id_map: &HashMap<String, NodeId>, id: &str) -> Result<NodeId, Error> {
    id_map
        .get(id)
        .copied()
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {}", quote(id))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SafeXmlLoader;

    fn default_attrs() -> Vec<String> {
        DEFAULT_ID_ATTRS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_refs() {
        assert_eq!(parse_same_document_ref("#abc"), Some("abc"));
        assert_eq!(parse_same_document_ref("#xpointer(id('abc'))"), Some("abc"));
        assert_eq!(parse_same_document_ref(""), None);
        assert_eq!(parse_same_document_ref("http://x/#abc"), None);
        assert_eq!(parse_xpointer_id("xpointer(/)"), None);
    }

    #[test]
    fn test_build_and_resolve() {
        let tree = SafeXmlLoader::new()
            .parse(r#"<r ID="one"><a Id="two"/><b id="three" ID="three"/></r>"#)
            .unwrap();
        let map = build_id_map(&tree, &default_attrs()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(resolve_id(&map, "one").unwrap(), tree.document_element());
        assert!(resolve_id(&map, "missing").is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let tree = SafeXmlLoader::new()
            .parse(r#"<r><a ID="x"/><b ID="x"/></r>"#)
            .unwrap();
        assert!(matches!(
            build_id_map(&tree, &default_attrs()),
            Err(Error::DuplicateId(_))
        ));
    }
}
