#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) for SAML documents.
//!
//! Verification is deliberately narrow: one signature, a fixed number of
//! same-document references, an allow-list of transforms and algorithms,
//! and a key that comes from the caller rather than the document.

pub mod context;
pub mod sign;
pub mod template;
pub mod verify;

pub use context::{SignContext, VerifyContext};
pub use sign::{sign, sign_enveloped};
pub use template::SignatureTemplate;
pub use verify::{verify, KeySource, VerifiedReference, VerifyResult};
