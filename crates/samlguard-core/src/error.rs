#![forbid(unsafe_code)]

use std::fmt;

/// Errors produced while loading, canonicalizing or verifying a document.
///
/// Every variant maps onto one [`ErrorKind`] through [`Error::kind`]; the
/// finer-grained variants exist for logging and tests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("disallowed construct: {0}")]
    DisallowedConstruct(String),

    #[error("entity declaration rejected: {0}")]
    EntityRejected(String),

    #[error("document limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("duplicate ID attribute value: {0}")]
    DuplicateId(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("no trusted certificate available: {0}")]
    CertificateRequired(String),

    #[error("invalid path expression: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a failed parse.
///
/// This is what callers log and branch on. It never carries document
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input is not well-formed XML, uses a disallowed construct, or
    /// does not have the shape the document flavor requires.
    MalformedDocument,
    /// The input declares entities or references an external DTD.
    EntityExpansionRejected,
    /// The signature, a digest, or the structure around the signature
    /// failed verification.
    SignatureInvalid,
    /// The signature uses an algorithm or transform that is not accepted.
    UnsupportedAlgorithm,
    /// The document is signed but no usable certificate was available.
    CertificateRequired,
}

impl ErrorKind {
    /// Is this a rejection raised by signature processing, as opposed to
    /// a parse failure?
    pub fn is_signature_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::SignatureInvalid
                | ErrorKind::UnsupportedAlgorithm
                | ErrorKind::CertificateRequired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedDocument => "malformed-document",
            ErrorKind::EntityExpansionRejected => "entity-expansion-rejected",
            ErrorKind::SignatureInvalid => "signature-invalid",
            ErrorKind::UnsupportedAlgorithm => "unsupported-algorithm",
            ErrorKind::CertificateRequired => "certificate-required",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::XmlParse(_)
            | Error::XmlStructure(_)
            | Error::DisallowedConstruct(_)
            | Error::LimitExceeded(_)
            | Error::InvalidPath(_)
            | Error::Io(_) => ErrorKind::MalformedDocument,
            Error::EntityRejected(_) => ErrorKind::EntityExpansionRejected,
            Error::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Error::CertificateRequired(_) => ErrorKind::CertificateRequired,
            Error::Crypto(_)
            | Error::Key(_)
            | Error::SignatureInvalid(_)
            | Error::DigestMismatch(_)
            | Error::DuplicateId(_)
            | Error::Canonicalization(_)
            | Error::Transform(_)
            | Error::Base64(_)
            | Error::MissingElement(_)
            | Error::MissingAttribute(_)
            | Error::InvalidUri(_)
            | Error::Certificate(_) => ErrorKind::SignatureInvalid,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
