#![forbid(unsafe_code)]

//! Key material for samlguard.
//!
//! A [`TrustCertificate`] is the only key source a verified outcome may
//! rest on; [`keyinfo`] reads the certificate a document carries for the
//! opt-in self-signed mode.

pub mod certificate;
pub mod keyinfo;
pub mod loader;

pub use certificate::TrustCertificate;
pub use loader::{load_certificate, load_signing_key_pem};
