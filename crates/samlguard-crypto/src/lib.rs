#![forbid(unsafe_code)]

//! Cryptographic algorithms for samlguard.
//!
//! Digests and the signature methods a SAML identity provider is expected
//! to use. MACs, DSA and legacy hashes are deliberately absent: asking for
//! them yields `UnsupportedAlgorithm`.

pub mod digest;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey, VerifyingKey};
