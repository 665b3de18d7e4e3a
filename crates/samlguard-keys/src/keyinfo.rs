#![forbid(unsafe_code)]

//! Reading the certificate a signature carries in `<ds:KeyInfo>`.
//!
//! Only `KeyInfo/X509Data/X509Certificate` is understood. `KeyValue`,
//! `RetrievalMethod`, `KeyName` and friends are ignored: a document never
//! gets to point the verifier at key material by any other route.

use crate::certificate::TrustCertificate;
use samlguard_core::{ns, Error};
use samlguard_xml::{NodeId, XmlTree};

/// The first `X509Certificate` under the signature's `KeyInfo`, if any.
///
/// A present but unparsable certificate is an error, not `None`.
pub fn embedded_certificate(tree: &XmlTree, signature: NodeId) -> Result<Option<TrustCertificate>, Error> {
    let Some(key_info) = tree.child_element(signature, ns::DSIG, ns::node::KEY_INFO) else {
        return Ok(None);
    };
    let cert_node = tree
        .child_elements(key_info, ns::DSIG, ns::node::X509_DATA)
        .find_map(|data| tree.child_element(data, ns::DSIG, ns::node::X509_CERTIFICATE));
    match cert_node {
        Some(node) => {
            let cert = TrustCertificate::from_base64(&tree.text_content(node))?;
            tracing::debug!(subject = cert.subject(), "found embedded certificate");
            Ok(Some(cert))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_xml::SafeXmlLoader;

    fn signature_with(key_info: &str) -> (XmlTree, NodeId) {
        let xml = format!(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">{key_info}</ds:Signature>"#
        );
        let tree = SafeXmlLoader::new().parse(&xml).unwrap();
        let sig = tree.document_element();
        (tree, sig)
    }

    #[test]
    fn test_extracts_certificate() {
        let cert = TrustCertificate::from_pem(include_str!("../../samlguard/tests/data/idp-rsa-cert.pem")).unwrap();
        let (tree, sig) = signature_with(&format!(
            "<ds:KeyInfo><ds:KeyName>x</ds:KeyName><ds:X509Data><ds:X509Certificate>\n{}\n</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
            cert.to_base64()
        ));
        assert_eq!(embedded_certificate(&tree, sig).unwrap(), Some(cert));
    }

    #[test]
    fn test_absent_certificate() {
        let (tree, sig) = signature_with("<ds:KeyInfo><ds:KeyName>idp</ds:KeyName></ds:KeyInfo>");
        assert_eq!(embedded_certificate(&tree, sig).unwrap(), None);
        let (tree, sig) = signature_with("");
        assert_eq!(embedded_certificate(&tree, sig).unwrap(), None);
    }

    #[test]
    fn test_garbage_certificate() {
        let (tree, sig) = signature_with(
            "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>!!!</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
        );
        assert!(matches!(embedded_certificate(&tree, sig), Err(Error::Base64(_))));
    }
}
