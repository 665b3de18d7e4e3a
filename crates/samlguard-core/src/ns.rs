#![forbid(unsafe_code)]

//! XML namespace constants and the fixed prefix table used by path queries.

use std::collections::BTreeMap;

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// SAML 2.0 protocol namespace
pub const SAMLP: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 assertion namespace
pub const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 metadata namespace
pub const MD: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// XML Schema namespace
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";

    // SAML protocol elements
    pub const AUTHN_REQUEST: &str = "AuthnRequest";
    pub const LOGOUT_REQUEST: &str = "LogoutRequest";
    pub const LOGOUT_RESPONSE: &str = "LogoutResponse";
    pub const RESPONSE: &str = "Response";
    pub const STATUS: &str = "Status";
    pub const STATUS_CODE: &str = "StatusCode";
    pub const SESSION_INDEX: &str = "SessionIndex";

    // SAML assertion elements
    pub const ASSERTION: &str = "Assertion";
    pub const ISSUER: &str = "Issuer";
    pub const SUBJECT: &str = "Subject";
    pub const NAME_ID: &str = "NameID";
    pub const CONDITIONS: &str = "Conditions";
    pub const AUDIENCE: &str = "Audience";
    pub const ATTRIBUTE: &str = "Attribute";
    pub const ATTRIBUTE_VALUE: &str = "AttributeValue";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "ID";
    pub const DSIG_ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const NAME: &str = "Name";
    pub const FORMAT: &str = "Format";
    pub const VALUE: &str = "Value";
}

// ── Prefix table ─────────────────────────────────────────────────────

/// Prefix to namespace URI mapping used to resolve path expressions.
///
/// The table is configuration, never document content: prefixes declared
/// inside a document have no influence on how a path is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    entries: BTreeMap<String, String>,
}

impl NamespaceTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The protocol table: `samlp`, `saml`, `ds`, `md`, `xs`, `xsi`.
    pub fn saml() -> Self {
        Self::new()
            .with("samlp", SAMLP)
            .with("saml", SAML)
            .with("ds", DSIG)
            .with("md", MD)
            .with("xs", XS)
            .with("xsi", XSI)
    }

    /// Add or replace a binding.
    pub fn with(mut self, prefix: &str, uri: &str) -> Self {
        self.entries.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML);
        }
        self.entries.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::saml()
    }
}
