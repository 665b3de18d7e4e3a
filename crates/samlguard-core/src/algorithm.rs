#![forbid(unsafe_code)]

//! Algorithm URI constants.
//!
//! Each constant is the URI string that appears in `Algorithm` attributes
//! of XML-DSig documents.

// ── Canonicalization ─────────────────────────────────────────────────

pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

// ── Digest algorithms ────────────────────────────────────────────────

pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const SHA224: &str = "http://www.w3.org/2001/04/xmldsig-more#sha224";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";
pub const SHA3_224: &str = "http://www.w3.org/2007/05/xmldsig-more#sha3-224";
pub const SHA3_256: &str = "http://www.w3.org/2007/05/xmldsig-more#sha3-256";
pub const SHA3_384: &str = "http://www.w3.org/2007/05/xmldsig-more#sha3-384";
pub const SHA3_512: &str = "http://www.w3.org/2007/05/xmldsig-more#sha3-512";

// ── RSA signature algorithms ─────────────────────────────────────────

pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA224: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha224";
pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

// ── RSA-PSS signature algorithms ─────────────────────────────────────

pub const RSA_PSS_SHA256: &str = "http://www.w3.org/2007/05/xmldsig-more#sha256-rsa-MGF1";
pub const RSA_PSS_SHA384: &str = "http://www.w3.org/2007/05/xmldsig-more#sha384-rsa-MGF1";
pub const RSA_PSS_SHA512: &str = "http://www.w3.org/2007/05/xmldsig-more#sha512-rsa-MGF1";

// ── ECDSA signature algorithms ───────────────────────────────────────

pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
pub const ECDSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384";

// ── Transform algorithms ─────────────────────────────────────────────

pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Algorithms whose security rests on SHA-1.
pub fn is_sha1_based(uri: &str) -> bool {
    matches!(uri, SHA1 | RSA_SHA1)
}
