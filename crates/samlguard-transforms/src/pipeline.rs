#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::enveloped::EnvelopedSignatureTransform;
use samlguard_c14n::C14nMode;
use samlguard_core::{algorithm, ns, redact, Error};
use samlguard_xml::{NodeId, NodeSet, XmlTree};

/// Data flowing through the transform pipeline.
pub enum TransformData<'t> {
    /// A node set over a borrowed tree.
    Xml { tree: &'t XmlTree, node_set: NodeSet },
    /// Octets produced by a canonicalization transform.
    Binary(Vec<u8>),
}

impl TransformData<'_> {
    /// Final octets. A node set left over at the end of the chain is
    /// serialized with inclusive C14N, as XML-DSig requires.
    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml { tree, node_set } => {
                samlguard_c14n::canonicalize(tree, C14nMode::Inclusive, Some(&node_set), &[])
            }
        }
    }
}

/// One step of a reference's transform chain.
pub trait Transform: Send + Sync {
    fn uri(&self) -> &str;

    fn execute<'t>(&self, input: TransformData<'t>) -> Result<TransformData<'t>, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pipeline a `<ds:Transforms>` element describes.
    ///
    /// `signature` is the `<ds:Signature>` the reference belongs to; the
    /// enveloped-signature transform removes exactly that element.
    pub fn from_element(tree: &XmlTree, transforms: NodeId, signature: NodeId) -> Result<Self, Error> {
        let mut pipeline = Self::new();
        for node in tree.element_children(transforms) {
            if !tree.is_dsig_element(node, ns::node::TRANSFORM) {
                return Err(Error::Transform("unexpected element inside Transforms".into()));
            }
            let uri = tree
                .element(node)
                .and_then(|e| e.attribute(ns::attr::ALGORITHM))
                .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;

            if uri == algorithm::ENVELOPED_SIGNATURE {
                pipeline.push(Box::new(EnvelopedSignatureTransform::new(signature)));
            } else if let Some(mode) = C14nMode::from_uri(uri) {
                let prefixes = read_inclusive_prefixes(tree, node);
                pipeline.push(Box::new(C14nTransform::new(mode, prefixes)));
            } else {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "transform: {}",
                    redact::quote(uri)
                )));
            }
        }
        Ok(pipeline)
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute<'t>(&self, input: TransformData<'t>) -> Result<TransformData<'t>, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(uri = transform.uri(), "applying transform");
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.uri())
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute<'t>(&self, input: TransformData<'t>) -> Result<TransformData<'t>, Error> {
        match input {
            TransformData::Xml { tree, node_set } => {
                let bytes = samlguard_c14n::canonicalize(tree, self.mode, Some(&node_set), &self.inclusive_prefixes)?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "canonicalization transform requires XML input".into(),
            )),
        }
    }
}

/// The `PrefixList` of an `<ec:InclusiveNamespaces>` child of `node`.
pub fn read_inclusive_prefixes(tree: &XmlTree, node: NodeId) -> Vec<String> {
    tree.child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| tree.element(n))
        .and_then(|e| e.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_xml::SafeXmlLoader;

    const DS: &str = r#"xmlns:ds="http://www.w3.org/2000/09/xmldsig#""#;

    fn doc(transforms: &str) -> String {
        format!(
            r#"<p:Root xmlns:p="urn:p" xmlns:xs="urn:xs" ID="r"><p:V>1</p:V><ds:Signature {DS}><ds:Transforms>{transforms}</ds:Transforms></ds:Signature></p:Root>"#
        )
    }

    fn run(xml: &str) -> Result<String, Error> {
        let tree = SafeXmlLoader::new().parse(xml)?;
        let sig = tree.find_element(ns::DSIG, "Signature").unwrap();
        let transforms = tree.find_element(ns::DSIG, "Transforms").unwrap();
        let pipeline = TransformPipeline::from_element(&tree, transforms, sig)?;
        let input = TransformData::Xml {
            tree: &tree,
            node_set: NodeSet::tree_without_comments(tree.document_element(), &tree),
        };
        let bytes = pipeline.execute(input)?.into_binary()?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_enveloped_then_exclusive() {
        let out = run(&doc(concat!(
            r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>"#,
            r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#
        )))
        .unwrap();
        assert_eq!(out, r#"<p:Root xmlns:p="urn:p" ID="r"><p:V>1</p:V></p:Root>"#);
    }

    #[test]
    fn test_prefix_list_honored() {
        let out = run(&doc(concat!(
            r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>"#,
            r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">"#,
            r#"<ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="xs"/>"#,
            r#"</ds:Transform>"#
        )))
        .unwrap();
        assert_eq!(
            out,
            r#"<p:Root xmlns:p="urn:p" xmlns:xs="urn:xs" ID="r"><p:V>1</p:V></p:Root>"#
        );
    }

    #[test]
    fn test_no_transforms_falls_back_to_inclusive() {
        let out = run(&doc("")).unwrap();
        assert!(out.starts_with(r#"<p:Root xmlns:p="urn:p" xmlns:xs="urn:xs" ID="r">"#));
        assert!(out.contains("<ds:Signature"));
    }

    #[test]
    fn test_rejected_transforms() {
        let xpath = run(&doc(r#"<ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xpath-19991116"/>"#));
        assert!(matches!(xpath, Err(Error::UnsupportedAlgorithm(_))));

        let base64 = run(&doc(r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#base64"/>"#));
        assert!(matches!(base64, Err(Error::UnsupportedAlgorithm(_))));

        let twice = run(&doc(concat!(
            r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
            r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#
        )));
        assert!(matches!(twice, Err(Error::Transform(_))));
    }
}
