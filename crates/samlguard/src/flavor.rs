#![forbid(unsafe_code)]

//! The SAML document types the parser understands and where each one may
//! carry its signature.

use samlguard_core::{ns, redact, Error};
use samlguard_xml::{NodeId, XmlTree};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFlavor {
    AuthnRequest,
    LogoutRequest,
    Response,
    LogoutResponse,
}

impl DocumentFlavor {
    pub const ALL: [DocumentFlavor; 4] = [
        DocumentFlavor::AuthnRequest,
        DocumentFlavor::LogoutRequest,
        DocumentFlavor::Response,
        DocumentFlavor::LogoutResponse,
    ];

    /// Local name of the expected `samlp:` root element.
    pub fn root_element(self) -> &'static str {
        match self {
            DocumentFlavor::AuthnRequest => ns::node::AUTHN_REQUEST,
            DocumentFlavor::LogoutRequest => ns::node::LOGOUT_REQUEST,
            DocumentFlavor::Response => ns::node::RESPONSE,
            DocumentFlavor::LogoutResponse => ns::node::LOGOUT_RESPONSE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentFlavor::AuthnRequest => "authn-request",
            DocumentFlavor::LogoutRequest => "logout-request",
            DocumentFlavor::Response => "response",
            DocumentFlavor::LogoutResponse => "logout-response",
        }
    }

    /// Find the signature that decides whether this document is signed.
    ///
    /// Only the schema positions count: a `ds:Signature` that is a direct
    /// child of the root, and for a Response, one that is a direct child
    /// of a top-level `saml:Assertion`. A root-level signature wins over
    /// assertion signatures. Two candidates for the same decision are
    /// ambiguous and rejected.
    pub fn locate_signature(self, tree: &XmlTree) -> Result<Option<NodeId>, Error> {
        let root = self.check_root(tree)?;

        if let Some(signature) = single_signature(tree, root, self.root_element())? {
            return Ok(Some(signature));
        }
        if self != DocumentFlavor::Response {
            return Ok(None);
        }

        let mut found = None;
        for assertion in tree.child_elements(root, ns::SAML, ns::node::ASSERTION) {
            if let Some(signature) = single_signature(tree, assertion, ns::node::ASSERTION)? {
                if found.replace(signature).is_some() {
                    return Err(Error::SignatureInvalid(
                        "more than one signed Assertion in Response".into(),
                    ));
                }
            }
        }
        Ok(found)
    }

    /// The per-flavor "is this document signed" predicate.
    pub fn is_signed(self, tree: &XmlTree) -> Result<bool, Error> {
        Ok(self.locate_signature(tree)?.is_some())
    }

    fn check_root(self, tree: &XmlTree) -> Result<NodeId, Error> {
        let root = tree.document_element();
        let matches = tree
            .element(root)
            .is_some_and(|e| e.name.is(ns::SAMLP, self.root_element()));
        if matches {
            Ok(root)
        } else {
            let found = tree
                .element(root)
                .map(|e| e.name.qualified())
                .unwrap_or_default();
            Err(Error::XmlStructure(format!(
                "expected samlp:{} root element, found {}",
                self.root_element(),
                redact::quote(&found)
            )))
        }
    }
}

fn single_signature(tree: &XmlTree, parent: NodeId, what: &str) -> Result<Option<NodeId>, Error> {
    let mut signatures = tree.child_elements(parent, ns::DSIG, ns::node::SIGNATURE);
    let first = signatures.next();
    if signatures.next().is_some() {
        return Err(Error::SignatureInvalid(format!("{what} carries more than one Signature")));
    }
    Ok(first)
}

impl fmt::Display for DocumentFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentFlavor::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s) || f.root_element().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown document flavor '{s}' (expected authn-request, logout-request, response or logout-response)")
            })
    }
}
