#![forbid(unsafe_code)]

//! Digest (hash) algorithms, looked up by their XML-DSig URI.

use digest::Digest;
use samlguard_core::{algorithm, Error};

/// A running hash computation.
pub trait DigestAlgorithm: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn uri(&self) -> &'static str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    let hasher: Box<dyn DigestAlgorithm> = match uri {
        algorithm::SHA1 => Box::new(Hasher::<sha1::Sha1>::new(algorithm::SHA1)),
        algorithm::SHA224 => Box::new(Hasher::<sha2::Sha224>::new(algorithm::SHA224)),
        algorithm::SHA256 => Box::new(Hasher::<sha2::Sha256>::new(algorithm::SHA256)),
        algorithm::SHA384 => Box::new(Hasher::<sha2::Sha384>::new(algorithm::SHA384)),
        algorithm::SHA512 => Box::new(Hasher::<sha2::Sha512>::new(algorithm::SHA512)),
        algorithm::SHA3_224 => Box::new(Hasher::<sha3::Sha3_224>::new(algorithm::SHA3_224)),
        algorithm::SHA3_256 => Box::new(Hasher::<sha3::Sha3_256>::new(algorithm::SHA3_256)),
        algorithm::SHA3_384 => Box::new(Hasher::<sha3::Sha3_384>::new(algorithm::SHA3_384)),
        algorithm::SHA3_512 => Box::new(Hasher::<sha3::Sha3_512>::new(algorithm::SHA3_512)),
        _ => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "digest algorithm: {}",
                samlguard_core::redact::quote(uri)
            )))
        }
    };
    Ok(hasher)
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

struct Hasher<D> {
    inner: D,
    uri: &'static str,
}

impl<D: Digest> Hasher<D> {
    fn new(uri: &'static str) -> Self {
        Self { inner: D::new(), uri }
    }
}

impl<D: Digest + Send> DigestAlgorithm for Hasher<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.inner.finalize().to_vec()
    }

    fn uri(&self) -> &'static str {
        self.uri
    }
}
