#![forbid(unsafe_code)]

//! X.509 trust certificates.

use base64::Engine;
use der::{Decode, Encode};
use samlguard_core::Error;
use samlguard_crypto::VerifyingKey;
use x509_cert::Certificate;

/// A certificate whose public key is trusted to sign documents.
///
/// Only the public key is used. Validity period, chain and revocation are
/// the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCertificate {
    der: Vec<u8>,
    subject: String,
    key: VerifyingKey,
}

impl TrustCertificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        let key = VerifyingKey::from_spki_der(&spki_der)?;
        Ok(Self {
            der: der.to_vec(),
            subject: cert.tbs_certificate.subject.to_string(),
            key,
        })
    }

    /// Parse a `-----BEGIN CERTIFICATE-----` PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let (label, der) = pem_rfc7468::decode_vec(pem.trim().as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM label, got: {label}"
            )));
        }
        Self::from_der(&der)
    }

    /// Parse the base64 text of an `X509Certificate` element.
    ///
    /// Whitespace inside the text is ignored.
    pub fn from_base64(text: &str) -> Result<Self, Error> {
        let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(clean)
            .map_err(|e| Error::Base64(format!("X509Certificate: {e}")))?;
        Self::from_der(&der)
    }

    /// The DER encoding, base64 encoded, as it appears in `X509Certificate`.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}
