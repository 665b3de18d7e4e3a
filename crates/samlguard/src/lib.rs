#![forbid(unsafe_code)]

//! Parse SAML protocol documents and keep only what a trusted signature
//! covers.
//!
//! ```no_run
//! use samlguard::{DocumentFlavor, ParseOutcome, SignatureVerifyingParser, TrustCertificate};
//!
//! # fn run(raw: &str, pem: &str) -> Result<(), samlguard::Error> {
//! let idp = TrustCertificate::from_pem(pem)?;
//! let parser = SignatureVerifyingParser::new(DocumentFlavor::Response);
//! match parser.load_outcome(raw, Some(&idp)) {
//!     ParseOutcome::Verified(_tree) => { /* signed content only */ }
//!     other => eprintln!("not trusted: {}", other.label()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod flavor;
pub mod parser;
pub mod saml;

pub use samlguard_c14n as c14n;
pub use samlguard_core as core;
pub use samlguard_crypto as crypto;
pub use samlguard_dsig as dsig;
pub use samlguard_keys as keys;
pub use samlguard_transforms as transforms;
pub use samlguard_xml as xml;

pub use flavor::DocumentFlavor;
pub use parser::{ParseOutcome, ParserConfig, SignatureVerifyingParser};
pub use samlguard_core::{Error, ErrorKind, NamespaceTable, ParseError};
pub use samlguard_keys::TrustCertificate;
pub use samlguard_xml::{LoaderLimits, SafeXmlLoader, XmlTree};
