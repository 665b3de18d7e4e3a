#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Register ID attributes, rejecting duplicate values
//! 2. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 3. Pick the verification key (trusted certificate, or opt-in embedded one)
//! 4. For each `<Reference>`: resolve the URI, check what it covers, run
//!    transforms, compute and compare the digest
//! 5. Canonicalize `<SignedInfo>` and check `<SignatureValue>`
//!
//! A valid result hands back the exact octets each reference digested, so
//! the caller can continue with the signed content and nothing else.

use crate::context::VerifyContext;
use base64::Engine;
use samlguard_c14n::C14nMode;
use samlguard_core::{algorithm, ns, redact, Error};
use samlguard_crypto::{digest, VerifyingKey};
use samlguard_keys::{keyinfo, TrustCertificate};
use samlguard_transforms::uri::resolve_reference;
use samlguard_transforms::{pipeline, TransformData, TransformPipeline};
use samlguard_xml::{xpath, NodeId, SafeXmlLoader, XmlTree};
use std::collections::HashMap;

/// Where the verification key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The caller-supplied trusted certificate.
    TrustAnchor { subject: String },
    /// The certificate carried in the signature's own `KeyInfo`.
    Embedded { subject: String },
}

/// One reference that verified.
#[derive(Debug, Clone)]
pub struct VerifiedReference {
    pub uri: String,
    /// The document node for `URI=""`, otherwise the referenced element.
    pub target: NodeId,
    /// The canonical octets that were digested.
    pub signed_bytes: Vec<u8>,
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub enum VerifyResult {
    Valid {
        references: Vec<VerifiedReference>,
        key_source: KeySource,
    },
    /// Well-formed signature whose digest or value does not check out.
    Invalid { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

/// Verify the `<ds:Signature>` element `signature` of `tree`.
pub fn verify(ctx: &VerifyContext<'_>, tree: &XmlTree, signature: NodeId) -> Result<VerifyResult, Error> {
    if !tree.is_dsig_element(signature, ns::node::SIGNATURE) {
        return Err(Error::XmlStructure("node is not a ds:Signature element".into()));
    }
    let id_map = xpath::build_id_map(tree, &ctx.id_attrs)?;

    let signed_info = required_child(tree, signature, ns::node::SIGNED_INFO)?;

    let c14n_method = required_child(tree, signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(tree, c14n_method, "CanonicalizationMethod")?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {}", redact::quote(c14n_uri))))?;
    let inclusive_prefixes = pipeline::read_inclusive_prefixes(tree, c14n_method);

    let sig_method = required_child(tree, signed_info, ns::node::SIGNATURE_METHOD)?;
    let sig_method_uri = algorithm_of(tree, sig_method, "SignatureMethod")?;
    check_sha1(ctx, sig_method_uri)?;
    let sig_alg = samlguard_crypto::sign::from_uri(sig_method_uri)?;

    let references: Vec<NodeId> = tree
        .child_elements(signed_info, ns::DSIG, ns::node::REFERENCE)
        .collect();
    if references.len() != ctx.expected_references {
        return Err(Error::SignatureInvalid(format!(
            "expected {} reference(s), found {}",
            ctx.expected_references,
            references.len()
        )));
    }

    let embedded;
    let (key, key_source) = match ctx.trust {
        Some(cert) => (cert.verifying_key(), KeySource::TrustAnchor { subject: cert.subject().to_owned() }),
        None if ctx.allow_embedded_certificate => {
            embedded = keyinfo::embedded_certificate(tree, signature)?
                .ok_or_else(|| Error::CertificateRequired("no trusted certificate and no embedded certificate".into()))?;
            embedded_key(&embedded)
        }
        None => {
            return Err(Error::CertificateRequired(
                "document is signed but no trusted certificate was supplied".into(),
            ))
        }
    };
    tracing::debug!(source = ?key_source, key = key.describe(), "verification key selected");

    let mut verified = Vec::with_capacity(references.len());
    for reference in references {
        match verify_reference(ctx, tree, &id_map, signature, reference)? {
            Ok(r) => verified.push(r),
            Err(reason) => return Ok(VerifyResult::Invalid { reason }),
        }
    }

    let c14n_signed_info = samlguard_c14n::canonicalize_subtree(tree, signed_info, c14n_mode, &inclusive_prefixes)?;

    let sig_value_node = required_child(tree, signature, ns::node::SIGNATURE_VALUE)?;
    let sig_value = decode_base64(&tree.text_content(sig_value_node), "SignatureValue")?;

    if sig_alg.verify(key, &c14n_signed_info, &sig_value)? {
        tracing::debug!(algorithm = sig_method_uri, "signature value verified");
        Ok(VerifyResult::Valid {
            references: verified,
            key_source,
        })
    } else {
        tracing::warn!(algorithm = sig_method_uri, "signature value verification failed");
        Ok(VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        })
    }
}

/// Parse `xml` and verify its only `<ds:Signature>`.
///
/// For callers that have no placement rules of their own. A document with
/// no signature, or more than one, is an error.
pub fn verify_document(ctx: &VerifyContext<'_>, xml: &str) -> Result<(XmlTree, VerifyResult), Error> {
    let tree = SafeXmlLoader::new().parse(xml)?;
    let signatures = tree.find_elements(ns::DSIG, ns::node::SIGNATURE);
    let signature = match signatures.as_slice() {
        [one] => *one,
        [] => return Err(Error::MissingElement("Signature".into())),
        _ => return Err(Error::SignatureInvalid("document contains more than one Signature".into())),
    };
    let result = verify(ctx, &tree, signature)?;
    Ok((tree, result))
}

fn embedded_key(cert: &TrustCertificate) -> (&VerifyingKey, KeySource) {
    (
        cert.verifying_key(),
        KeySource::Embedded {
            subject: cert.subject().to_owned(),
        },
    )
}

/// Verify one `<Reference>`. The inner `Err` is a digest mismatch.
fn verify_reference(
    ctx: &VerifyContext<'_>,
    tree: &XmlTree,
    id_map: &HashMap<String, NodeId>,
    signature: NodeId,
    reference: NodeId,
) -> Result<Result<VerifiedReference, String>, Error> {
    let uri = tree
        .element(reference)
        .and_then(|e| e.attribute(ns::attr::URI))
        .ok_or_else(|| Error::MissingAttribute("URI on Reference".into()))?;
    tracing::debug!(uri = %redact::quote(uri), "processing reference");

    let resolved = resolve_reference(uri, tree, id_map)?;
    if ctx.require_parent_reference {
        check_coverage(tree, signature, resolved.target, uri)?;
    }

    let digest_method = required_child(tree, reference, ns::node::DIGEST_METHOD)?;
    let digest_uri = algorithm_of(tree, digest_method, "DigestMethod")?;
    check_sha1(ctx, digest_uri)?;

    let digest_value_node = required_child(tree, reference, ns::node::DIGEST_VALUE)?;
    let expected = decode_base64(&tree.text_content(digest_value_node), "DigestValue")?;

    let chain = match tree.child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        Some(transforms) => TransformPipeline::from_element(tree, transforms, signature)?,
        None => TransformPipeline::new(),
    };
    let input = TransformData::Xml {
        tree,
        node_set: resolved.node_set,
    };
    let signed_bytes = chain.execute(input)?.into_binary()?;
    let computed = digest::digest(digest_uri, &signed_bytes)?;

    if computed != expected {
        tracing::warn!(uri = %redact::quote(uri), "digest mismatch");
        return Ok(Err(format!(
            "digest mismatch for reference {}",
            redact::quote(uri)
        )));
    }

    Ok(Ok(VerifiedReference {
        uri: uri.to_owned(),
        target: resolved.target,
        signed_bytes,
    }))
}

/// The reference must cover the element the signature sits in.
///
/// This is what defeats signature wrapping: a valid signature over some
/// other element of the document proves nothing about the element the
/// application will read.
fn check_coverage(tree: &XmlTree, signature: NodeId, target: NodeId, uri: &str) -> Result<(), Error> {
    let parent = tree
        .parent(signature)
        .ok_or_else(|| Error::XmlStructure("Signature has no parent".into()))?;
    let covered = if target == tree.root() {
        parent == tree.document_element()
    } else {
        target == parent
    };
    if covered {
        Ok(())
    } else {
        Err(Error::SignatureInvalid(format!(
            "reference {} does not cover the signature's parent element",
            redact::quote(uri)
        )))
    }
}

fn check_sha1(ctx: &VerifyContext<'_>, uri: &str) -> Result<(), Error> {
    if !ctx.allow_sha1 && algorithm::is_sha1_based(uri) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "SHA-1 based algorithm not allowed: {uri}"
        )));
    }
    Ok(())
}

fn required_child(tree: &XmlTree, parent: NodeId, local_name: &str) -> Result<NodeId, Error> {
    tree.child_element(parent, ns::DSIG, local_name)
        .ok_or_else(|| Error::MissingElement(local_name.to_owned()))
}

fn algorithm_of<'t>(tree: &'t XmlTree, node: NodeId, element: &str) -> Result<&'t str, Error> {
    tree.element(node)
        .and_then(|e| e.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {element}")))
}

pub(crate) fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}
