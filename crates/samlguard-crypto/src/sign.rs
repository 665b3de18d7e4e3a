#![forbid(unsafe_code)]

//! Signature algorithms: RSA PKCS#1 v1.5, RSA-PSS and ECDSA.
//!
//! ECDSA signatures travel in the XML-DSig `r||s` form, not DER.

use samlguard_core::{algorithm, redact, Error};
use signature::SignatureEncoding;

/// Private key material for producing signatures.
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP384(p384::ecdsa::SigningKey),
}

/// Public key material for checking signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyingKey {
    Rsa(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::VerifyingKey),
}

impl SigningKey {
    /// Decode a PKCS#8 `PrivateKeyInfo` holding an RSA, P-256 or P-384 key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, Error> {
        use pkcs8::DecodePrivateKey;
        if let Ok(k) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(SigningKey::Rsa(k));
        }
        if let Ok(k) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(SigningKey::EcP256(k));
        }
        if let Ok(k) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(SigningKey::EcP384(k));
        }
        Err(Error::Key("unsupported PKCS#8 private key (expected RSA, P-256 or P-384)".into()))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            SigningKey::Rsa(k) => VerifyingKey::Rsa(k.to_public_key()),
            SigningKey::EcP256(k) => VerifyingKey::EcP256(*k.verifying_key()),
            SigningKey::EcP384(k) => VerifyingKey::EcP384(*k.verifying_key()),
        }
    }
}

impl VerifyingKey {
    /// Decode a DER `SubjectPublicKeyInfo` holding an RSA, P-256 or P-384 key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, Error> {
        use spki::DecodePublicKey;
        if let Ok(k) = rsa::RsaPublicKey::from_public_key_der(der) {
            return Ok(VerifyingKey::Rsa(k));
        }
        if let Ok(k) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(VerifyingKey::EcP256(k));
        }
        if let Ok(k) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(VerifyingKey::EcP384(k));
        }
        Err(Error::Key("unsupported public key algorithm (expected RSA, P-256 or P-384)".into()))
    }

    /// Short human-readable key type, for logs.
    pub fn describe(&self) -> &'static str {
        match self {
            VerifyingKey::Rsa(_) => "RSA",
            VerifyingKey::EcP256(_) => "EC P-256",
            VerifyingKey::EcP384(_) => "EC P-384",
        }
    }
}

/// A signature method named by a `SignatureMethod/@Algorithm` URI.
pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    /// `Ok(false)` for a well-formed signature that does not verify.
    fn verify(&self, key: &VerifyingKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    let alg: Box<dyn SignatureAlgorithm> = match uri {
        algorithm::RSA_SHA1 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA1, hash: HashType::Sha1 }),
        algorithm::RSA_SHA224 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA224, hash: HashType::Sha224 }),
        algorithm::RSA_SHA256 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA256, hash: HashType::Sha256 }),
        algorithm::RSA_SHA384 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA384, hash: HashType::Sha384 }),
        algorithm::RSA_SHA512 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA512, hash: HashType::Sha512 }),

        algorithm::RSA_PSS_SHA256 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA256, hash: HashType::Sha256 }),
        algorithm::RSA_PSS_SHA384 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA384, hash: HashType::Sha384 }),
        algorithm::RSA_PSS_SHA512 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA512, hash: HashType::Sha512 }),

        algorithm::ECDSA_SHA256 => Box::new(EcdsaP256),
        algorithm::ECDSA_SHA384 => Box::new(EcdsaP384),

        _ => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "signature algorithm: {}",
                redact::quote(uri)
            )))
        }
    };
    Ok(alg)
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

/// Evaluate `$body` with `$h` bound to the hasher type for `$hash`.
macro_rules! with_hash {
    ($hash:expr, $h:ident => $body:expr) => {
        match $hash {
            HashType::Sha1 => {
                type $h = sha1::Sha1;
                $body
            }
            HashType::Sha224 => {
                type $h = sha2::Sha224;
                $body
            }
            HashType::Sha256 => {
                type $h = sha2::Sha256;
                $body
            }
            HashType::Sha384 => {
                type $h = sha2::Sha384;
                $body
            }
            HashType::Sha512 => {
                type $h = sha2::Sha512;
                $body
            }
        }
    };
}

fn key_mismatch(uri: &str, key: &VerifyingKey) -> Error {
    Error::Key(format!("{} key cannot verify {uri}", key.describe()))
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required".into()));
        };
        with_hash!(self.hash, H => {
            let sk = rsa::pkcs1v15::SigningKey::<H>::new(private_key.clone());
            let sig = sk
                .try_sign(data)
                .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))?;
            Ok(sig.to_vec())
        })
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::Rsa(public_key) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        with_hash!(self.hash, H => {
            let vk = rsa::pkcs1v15::VerifyingKey::<H>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        })
    }
}

// ── RSA-PSS ──────────────────────────────────────────────────────────

struct RsaPss {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPss {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::RandomizedSigner;
        let SigningKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required for PSS".into()));
        };
        let mut rng = rand::thread_rng();
        with_hash!(self.hash, H => {
            let sk = rsa::pss::SigningKey::<H>::new(private_key.clone());
            let sig = sk
                .try_sign_with_rng(&mut rng, data)
                .map_err(|e| Error::Crypto(format!("RSA-PSS signing failed: {e}")))?;
            Ok(sig.to_vec())
        })
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::Rsa(public_key) = key else {
            return Err(key_mismatch(self.uri, key));
        };
        let sig = rsa::pss::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA-PSS signature: {e}")))?;
        with_hash!(self.hash, H => {
            let vk = rsa::pss::VerifyingKey::<H>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        })
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// ECDSA-SHA256, accepted only with a P-256 key.
struct EcdsaP256;

/// ECDSA-SHA384, accepted only with a P-384 key.
struct EcdsaP384;

/// Split an XML-DSig `r||s` value into its two halves.
fn split_rs(rs: &[u8], field_len: usize, curve: &str) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if rs.len() != field_len * 2 {
        return Err(Error::Crypto(format!(
            "{curve} signature must be {} bytes, got {}",
            field_len * 2,
            rs.len()
        )));
    }
    let (r, s) = rs.split_at(field_len);
    Ok((r.to_vec(), s.to_vec()))
}

impl SignatureAlgorithm for EcdsaP256 {
    fn uri(&self) -> &'static str {
        algorithm::ECDSA_SHA256
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP256(sk) = key else {
            return Err(Error::Key("P-256 signing key required".into()));
        };
        let sig: p256::ecdsa::Signature = sk
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {e}")))?;
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::EcP256(vk) = key else {
            return Err(key_mismatch(self.uri(), key));
        };
        let (r, s) = split_rs(sig_bytes, 32, "P-256")?;
        let sig = p256::ecdsa::Signature::from_scalars(
            *p256::FieldBytes::from_slice(&r),
            *p256::FieldBytes::from_slice(&s),
        )
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

impl SignatureAlgorithm for EcdsaP384 {
    fn uri(&self) -> &'static str {
        algorithm::ECDSA_SHA384
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP384(sk) = key else {
            return Err(Error::Key("P-384 signing key required".into()));
        };
        let sig: p384::ecdsa::Signature = sk
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {e}")))?;
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &VerifyingKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let VerifyingKey::EcP384(vk) = key else {
            return Err(key_mismatch(self.uri(), key));
        };
        let (r, s) = split_rs(sig_bytes, 48, "P-384")?;
        let sig = p384::ecdsa::Signature::from_scalars(
            *p384::FieldBytes::from_slice(&r),
            *p384::FieldBytes::from_slice(&s),
        )
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}
