#![forbid(unsafe_code)]

//! Configuration for signature operations.

use samlguard_crypto::SigningKey;
use samlguard_keys::TrustCertificate;
use samlguard_xml::xpath::DEFAULT_ID_ATTRS;

/// Context for verifying one signature.
#[derive(Debug, Clone)]
pub struct VerifyContext<'a> {
    /// The certificate whose key must have produced the signature.
    pub trust: Option<&'a TrustCertificate>,
    /// Fall back to the certificate inside `KeyInfo` when `trust` is
    /// absent. Such a result only proves integrity, not origin.
    pub allow_embedded_certificate: bool,
    /// Accept SHA-1 digests and RSA-SHA1 signatures.
    pub allow_sha1: bool,
    /// Exact number of `Reference` elements `SignedInfo` must contain.
    pub expected_references: usize,
    /// Attribute names that carry element IDs.
    pub id_attrs: Vec<String>,
    /// Each reference must cover the element that contains the signature
    /// (or the whole document, for a signature on the document element).
    pub require_parent_reference: bool,
}

impl<'a> VerifyContext<'a> {
    pub fn new(trust: Option<&'a TrustCertificate>) -> Self {
        Self {
            trust,
            allow_embedded_certificate: false,
            allow_sha1: false,
            expected_references: 1,
            id_attrs: DEFAULT_ID_ATTRS.iter().map(|s| (*s).to_owned()).collect(),
            require_parent_reference: true,
        }
    }

    pub fn allow_embedded_certificate(mut self, allow: bool) -> Self {
        self.allow_embedded_certificate = allow;
        self
    }

    pub fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    pub fn expected_references(mut self, count: usize) -> Self {
        self.expected_references = count;
        self
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.id_attrs.iter().any(|a| a == name) {
            self.id_attrs.push(name.to_owned());
        }
    }
}

impl Default for VerifyContext<'_> {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Context for signing templates.
pub struct SignContext {
    pub key: SigningKey,
    /// Certificate to embed in `KeyInfo` when building templates.
    pub certificate: Option<TrustCertificate>,
    pub id_attrs: Vec<String>,
}

impl SignContext {
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            certificate: None,
            id_attrs: DEFAULT_ID_ATTRS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    pub fn with_certificate(mut self, certificate: TrustCertificate) -> Self {
        self.certificate = Some(certificate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict() {
        let ctx = VerifyContext::default();
        assert!(ctx.trust.is_none());
        assert!(!ctx.allow_embedded_certificate);
        assert!(!ctx.allow_sha1);
        assert_eq!(ctx.expected_references, 1);
        assert!(ctx.require_parent_reference);
        assert_eq!(ctx.id_attrs, ["ID", "Id", "id"]);
    }

    #[test]
    fn test_add_id_attr_dedups() {
        let mut ctx = VerifyContext::default();
        ctx.add_id_attr("AssertionID");
        ctx.add_id_attr("ID");
        assert_eq!(ctx.id_attrs.len(), 4);
    }
}
