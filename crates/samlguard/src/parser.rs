#![forbid(unsafe_code)]

//! The signature-verifying document parser.
//!
//! [`SignatureVerifyingParser::load`] parses a document, decides with the
//! flavor's signature predicate whether it is signed, and if so verifies it
//! and swaps the working tree for one built from the signed octets alone.

use crate::flavor::DocumentFlavor;
use samlguard_core::{redact, Error, ErrorKind, NamespaceTable};
use samlguard_dsig::{KeySource, VerifiedReference, VerifyContext, VerifyResult};
use samlguard_keys::TrustCertificate;
use samlguard_xml::xpath::DEFAULT_ID_ATTRS;
use samlguard_xml::{LoaderLimits, SafeXmlLoader, XmlTree};
use tracing::{debug, info, warn};

/// Result of loading one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// No signature in any of the flavor's signature positions. The tree
    /// is the full document and nothing in it is authenticated.
    Unsigned(XmlTree),
    /// Verified with the caller's trusted certificate. The tree holds only
    /// the signed content.
    Verified(XmlTree),
    /// Verified with the certificate the document carries. Proves the
    /// content was not altered after signing, not who signed it.
    SelfSigned(XmlTree),
    Rejected(ErrorKind),
}

impl ParseOutcome {
    pub fn tree(&self) -> Option<&XmlTree> {
        match self {
            ParseOutcome::Unsigned(tree) | ParseOutcome::Verified(tree) | ParseOutcome::SelfSigned(tree) => {
                Some(tree)
            }
            ParseOutcome::Rejected(_) => None,
        }
    }

    pub fn into_tree(self) -> Option<XmlTree> {
        match self {
            ParseOutcome::Unsigned(tree) | ParseOutcome::Verified(tree) | ParseOutcome::SelfSigned(tree) => {
                Some(tree)
            }
            ParseOutcome::Rejected(_) => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, ParseOutcome::Verified(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ParseOutcome::Rejected(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParseOutcome::Unsigned(_) => "unsigned",
            ParseOutcome::Verified(_) => "verified",
            ParseOutcome::SelfSigned(_) => "self-signed",
            ParseOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Parser settings.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub limits: LoaderLimits,
    /// Prefix table for path queries over the resulting tree.
    pub namespaces: NamespaceTable,
    /// Verify with the document's own certificate when no trusted one is
    /// supplied, yielding [`ParseOutcome::SelfSigned`].
    pub allow_embedded_certificate: bool,
    pub allow_sha1: bool,
    pub expected_references: usize,
    pub id_attrs: Vec<String>,
}

impl ParserConfig {
    pub fn allow_embedded_certificate(mut self, allow: bool) -> Self {
        self.allow_embedded_certificate = allow;
        self
    }

    pub fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    pub fn limits(mut self, limits: LoaderLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn add_id_attr(&mut self, name: &str) {
        if !self.id_attrs.iter().any(|a| a == name) {
            self.id_attrs.push(name.to_owned());
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            limits: LoaderLimits::default(),
            namespaces: NamespaceTable::saml(),
            allow_embedded_certificate: false,
            allow_sha1: false,
            expected_references: 1,
            id_attrs: DEFAULT_ID_ATTRS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// Parser for one [`DocumentFlavor`].
#[derive(Debug, Clone)]
pub struct SignatureVerifyingParser {
    flavor: DocumentFlavor,
    config: ParserConfig,
    loader: SafeXmlLoader,
}

impl SignatureVerifyingParser {
    pub fn new(flavor: DocumentFlavor) -> Self {
        Self::with_config(flavor, ParserConfig::default())
    }

    pub fn with_config(flavor: DocumentFlavor, config: ParserConfig) -> Self {
        let loader = SafeXmlLoader::with_limits(config.limits);
        Self { flavor, config, loader }
    }

    pub fn flavor(&self) -> DocumentFlavor {
        self.flavor
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.config.namespaces
    }

    /// Parse and, if signed, verify a document.
    ///
    /// Never returns [`ParseOutcome::Rejected`]; failures are the `Err`
    /// side. See [`Self::load_outcome`] for the folded form.
    pub fn load(&self, raw: &str, trust: Option<&TrustCertificate>) -> Result<ParseOutcome, Error> {
        let input = redact::input_digest(raw.as_bytes());
        let tree = self.loader.parse(raw)?;

        let Some(signature) = self.flavor.locate_signature(&tree)? else {
            debug!(flavor = %self.flavor, input = %input, "document is not signed");
            return Ok(ParseOutcome::Unsigned(tree));
        };
        debug!(flavor = %self.flavor, input = %input, "signature located");

        let mut ctx = VerifyContext::new(trust)
            .allow_embedded_certificate(self.config.allow_embedded_certificate)
            .allow_sha1(self.config.allow_sha1)
            .expected_references(self.config.expected_references);
        ctx.id_attrs = self.config.id_attrs.clone();

        match samlguard_dsig::verify(&ctx, &tree, signature)? {
            VerifyResult::Invalid { reason } => Err(Error::SignatureInvalid(reason)),
            VerifyResult::Valid { references, key_source } => {
                let signed = self.signed_tree(&references)?;
                let outcome = match key_source {
                    KeySource::TrustAnchor { .. } => ParseOutcome::Verified(signed),
                    KeySource::Embedded { .. } => ParseOutcome::SelfSigned(signed),
                };
                info!(
                    flavor = %self.flavor,
                    input = %input,
                    outcome = outcome.label(),
                    "signature verified"
                );
                Ok(outcome)
            }
        }
    }

    /// Like [`Self::load`], with errors folded into
    /// [`ParseOutcome::Rejected`].
    pub fn load_outcome(&self, raw: &str, trust: Option<&TrustCertificate>) -> ParseOutcome {
        match self.load(raw, trust) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    flavor = %self.flavor,
                    input = %redact::input_digest(raw.as_bytes()),
                    kind = %e.kind(),
                    error = %e,
                    "document rejected"
                );
                ParseOutcome::Rejected(e.kind())
            }
        }
    }

    /// Byte-oriented [`Self::load`]. The input must be UTF-8.
    pub fn load_bytes(&self, raw: &[u8], trust: Option<&TrustCertificate>) -> Result<ParseOutcome, Error> {
        let text = std::str::from_utf8(raw).map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        self.load(text, trust)
    }

    /// The tree the signature vouches for, re-read from the digested octets.
    ///
    /// Every reference covers the signature's parent, so the first one is
    /// as good as any.
    fn signed_tree(&self, references: &[VerifiedReference]) -> Result<XmlTree, Error> {
        let reference = references
            .first()
            .ok_or_else(|| Error::SignatureInvalid("signature has no references".into()))?;
        self.loader.parse_bytes(&reference.signed_bytes)
    }
}
