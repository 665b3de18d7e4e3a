#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Signs a document that already contains a `<Signature>` template with
//! empty `<DigestValue>` and `<SignatureValue>` elements. Use
//! [`crate::SignatureTemplate`] to place such a template.

use crate::context::SignContext;
use crate::verify::decode_base64;
use base64::Engine;
use samlguard_c14n::C14nMode;
use samlguard_core::{ns, redact, Error};
use samlguard_crypto::digest;
use samlguard_transforms::uri::resolve_reference;
use samlguard_transforms::{pipeline, TransformData, TransformPipeline};
use samlguard_xml::writer::serialize_with;
use samlguard_xml::{xpath, Edits, NodeId, SafeXmlLoader, XmlTree};

/// Sign an XML template document.
///
/// Digests are filled in first and the document is re-read, so the
/// `SignedInfo` that gets signed is exactly the one in the output.
/// Returns the signed document as a string.
pub fn sign(ctx: &SignContext, template_xml: &str) -> Result<String, Error> {
    let loader = SafeXmlLoader::new();

    // Pass 1: reference digests.
    let tree = loader.parse(template_xml)?;
    let signature = first_signature(&tree)?;
    let signed_info = child(&tree, signature, ns::node::SIGNED_INFO)?;
    let id_map = xpath::build_id_map(&tree, &ctx.id_attrs)?;

    let mut edits = Edits::new();
    for reference in tree.child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        let uri = tree
            .element(reference)
            .and_then(|e| e.attribute(ns::attr::URI))
            .unwrap_or("");
        let digest_uri = algorithm_of(&tree, child(&tree, reference, ns::node::DIGEST_METHOD)?)?;
        let resolved = resolve_reference(uri, &tree, &id_map)?;

        let chain = match tree.child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
            Some(transforms) => TransformPipeline::from_element(&tree, transforms, signature)?,
            None => TransformPipeline::new(),
        };
        let bytes = chain
            .execute(TransformData::Xml {
                tree: &tree,
                node_set: resolved.node_set,
            })?
            .into_binary()?;
        let value = digest::digest(digest_uri, &bytes)?;
        tracing::debug!(uri = %redact::quote(uri), "reference digested");

        let digest_value = child(&tree, reference, ns::node::DIGEST_VALUE)?;
        edits = edits.replace_text(digest_value, encode(&value));
    }
    let with_digests = serialize_with(&tree, &edits)?;

    // Pass 2: the signature over the filled-in SignedInfo.
    let tree = loader.parse(&with_digests)?;
    let signature = first_signature(&tree)?;
    let signed_info = child(&tree, signature, ns::node::SIGNED_INFO)?;

    let c14n_method = child(&tree, signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(&tree, c14n_method)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {}", redact::quote(c14n_uri))))?;
    let prefixes = pipeline::read_inclusive_prefixes(&tree, c14n_method);
    let canonical = samlguard_c14n::canonicalize_subtree(&tree, signed_info, c14n_mode, &prefixes)?;

    let sig_uri = algorithm_of(&tree, child(&tree, signed_info, ns::node::SIGNATURE_METHOD)?)?;
    let alg = samlguard_crypto::sign::from_uri(sig_uri)?;
    let value = alg.sign(&ctx.key, &canonical)?;
    tracing::debug!(algorithm = sig_uri, "signed SignedInfo");

    let signature_value = child(&tree, signature, ns::node::SIGNATURE_VALUE)?;
    serialize_with(&tree, &Edits::new().replace_text(signature_value, encode(&value)))
}

/// Sign `document`, placing a fresh signature over the element with ID
/// `reference_id`.
pub fn sign_enveloped(
    ctx: &SignContext,
    document: &str,
    reference_id: &str,
    signature_method: &str,
) -> Result<String, Error> {
    let mut template = crate::SignatureTemplate::new(reference_id).signature_method(signature_method);
    if let Some(cert) = &ctx.certificate {
        template = template.with_certificate(cert.clone());
    }
    let placed = template.insert_into(document, &ctx.id_attrs)?;
    sign(ctx, &placed)
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn first_signature(tree: &XmlTree) -> Result<NodeId, Error> {
    tree.find_element(ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))
}

fn child(tree: &XmlTree, parent: NodeId, local_name: &str) -> Result<NodeId, Error> {
    tree.child_element(parent, ns::DSIG, local_name)
        .ok_or_else(|| Error::MissingElement(local_name.to_owned()))
}

fn algorithm_of(tree: &XmlTree, node: NodeId) -> Result<&str, Error> {
    tree.element(node)
        .and_then(|e| e.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingAttribute("Algorithm".into()))
}

/// Raw bytes of a signature's `SignatureValue`.
pub fn signature_value(tree: &XmlTree, signature: NodeId) -> Result<Vec<u8>, Error> {
    let node = child(tree, signature, ns::node::SIGNATURE_VALUE)?;
    decode_base64(&tree.text_content(node), "SignatureValue")
}
