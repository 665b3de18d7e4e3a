#![forbid(unsafe_code)]

//! Building and placing enveloped signature templates.

use samlguard_c14n::C14nMode;
use samlguard_core::{algorithm, ns, Error};
use samlguard_keys::TrustCertificate;
use samlguard_xml::writer::serialize_with;
use samlguard_xml::{xpath, Edits, SafeXmlLoader, XmlWriter};

/// An enveloped signature with empty `DigestValue` and `SignatureValue`,
/// ready for [`crate::sign()`].
///
/// The reference always carries the enveloped-signature transform followed
/// by the canonicalization transform, which is what SAML relying parties
/// expect.
#[derive(Debug, Clone)]
pub struct SignatureTemplate {
    reference_id: String,
    c14n: C14nMode,
    signature_method: String,
    digest_method: String,
    certificate: Option<TrustCertificate>,
}

impl SignatureTemplate {
    /// A template referencing the element with ID `reference_id`, or the
    /// whole document when it is empty.
    pub fn new(reference_id: &str) -> Self {
        Self {
            reference_id: reference_id.to_owned(),
            c14n: C14nMode::Exclusive,
            signature_method: algorithm::RSA_SHA256.to_owned(),
            digest_method: algorithm::SHA256.to_owned(),
            certificate: None,
        }
    }

    pub fn canonicalization(mut self, mode: C14nMode) -> Self {
        self.c14n = mode;
        self
    }

    pub fn signature_method(mut self, uri: &str) -> Self {
        self.signature_method = uri.to_owned();
        self
    }

    pub fn digest_method(mut self, uri: &str) -> Self {
        self.digest_method = uri.to_owned();
        self
    }

    /// Embed `certificate` in `KeyInfo/X509Data`.
    pub fn with_certificate(mut self, certificate: TrustCertificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// The `<ds:Signature>` element as markup.
    pub fn to_xml(&self) -> Result<String, Error> {
        let uri = if self.reference_id.is_empty() {
            String::new()
        } else {
            format!("#{}", self.reference_id)
        };

        let mut w = XmlWriter::new();
        w.start_element("ds:Signature", &[("xmlns:ds", ns::DSIG)])?;
        w.start_element("ds:SignedInfo", &[])?;
        w.empty_element("ds:CanonicalizationMethod", &[("Algorithm", self.c14n.uri())])?;
        w.empty_element("ds:SignatureMethod", &[("Algorithm", self.signature_method.as_str())])?;
        w.start_element("ds:Reference", &[("URI", uri.as_str())])?;
        w.start_element("ds:Transforms", &[])?;
        w.empty_element("ds:Transform", &[("Algorithm", algorithm::ENVELOPED_SIGNATURE)])?;
        w.empty_element("ds:Transform", &[("Algorithm", self.c14n.uri())])?;
        w.end_element("ds:Transforms")?;
        w.empty_element("ds:DigestMethod", &[("Algorithm", self.digest_method.as_str())])?;
        w.text_element("ds:DigestValue", &[], "")?;
        w.end_element("ds:Reference")?;
        w.end_element("ds:SignedInfo")?;
        w.text_element("ds:SignatureValue", &[], "")?;
        if let Some(cert) = &self.certificate {
            w.start_element("ds:KeyInfo", &[])?;
            w.start_element("ds:X509Data", &[])?;
            w.text_element("ds:X509Certificate", &[], &cert.to_base64())?;
            w.end_element("ds:X509Data")?;
            w.end_element("ds:KeyInfo")?;
        }
        w.end_element("ds:Signature")?;
        w.into_string()
    }

    /// Place this template inside the referenced element of `document`.
    ///
    /// The signature goes right after the element's leading `saml:Issuer`
    /// if it has one, otherwise it becomes the first child, matching the
    /// schema position SAML gives `ds:Signature`.
    pub fn insert_into(&self, document: &str, id_attrs: &[String]) -> Result<String, Error> {
        let tree = SafeXmlLoader::new().parse(document)?;
        let target = if self.reference_id.is_empty() {
            tree.document_element()
        } else {
            let id_map = xpath::build_id_map(&tree, id_attrs)?;
            xpath::resolve_id(&id_map, &self.reference_id)?
        };
        if tree.child_element(target, ns::DSIG, ns::node::SIGNATURE).is_some() {
            return Err(Error::XmlStructure("element is already signed".into()));
        }

        let markup = self.to_xml()?;
        let edits = match tree.element_children(target).next() {
            Some(first) if tree.element(first).is_some_and(|e| e.name.is(ns::SAML, ns::node::ISSUER)) => {
                Edits::new().insert_after(first, markup)
            }
            _ => Edits::new().insert_first(target, markup),
        };
        serialize_with(&tree, &edits)
    }
}
