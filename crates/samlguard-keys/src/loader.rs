#![forbid(unsafe_code)]

//! Loading keys and certificates from files and PEM text.

use crate::certificate::TrustCertificate;
use samlguard_core::Error;
use samlguard_crypto::SigningKey;
use std::path::Path;

/// Load a private signing key from PEM.
///
/// Accepts PKCS#8 (`PRIVATE KEY`) for RSA, P-256 and P-384, and PKCS#1
/// (`RSA PRIVATE KEY`) for RSA.
pub fn load_signing_key_pem(pem: &str) -> Result<SigningKey, Error> {
    let (label, der) = pem_rfc7468::decode_vec(pem.trim().as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode private key PEM: {e}")))?;
    match label {
        "PRIVATE KEY" => SigningKey::from_pkcs8_der(&der),
        "RSA PRIVATE KEY" => {
            use pkcs1::DecodeRsaPrivateKey;
            let key = rsa::RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| Error::Key(format!("failed to parse RSA private key: {e}")))?;
            Ok(SigningKey::Rsa(key))
        }
        "ENCRYPTED PRIVATE KEY" => Err(Error::Key("encrypted private keys are not supported".into())),
        other => Err(Error::Key(format!("unexpected PEM label: {other}"))),
    }
}

/// Load a certificate from a file, accepting PEM or DER.
pub fn load_certificate(path: &Path) -> Result<TrustCertificate, Error> {
    let data = std::fs::read(path)?;
    let cert = match std::str::from_utf8(&data) {
        Ok(text) if text.contains("-----BEGIN") => TrustCertificate::from_pem(text)?,
        _ => TrustCertificate::from_der(&data)?,
    };
    tracing::debug!(path = %path.display(), subject = cert.subject(), "loaded certificate");
    Ok(cert)
}

/// Load a private signing key from a PEM file.
pub fn load_signing_key_file(path: &Path) -> Result<SigningKey, Error> {
    let text = std::fs::read_to_string(path)?;
    load_signing_key_pem(&text)
}
