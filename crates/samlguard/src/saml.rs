#![forbid(unsafe_code)]

//! Read-only views over SAML documents.
//!
//! Views do not check signatures. Build them from the tree of a
//! [`crate::ParseOutcome`] the caller has decided to trust.

use rand::RngCore;
use samlguard_core::{ns, redact, Error, NamespaceTable};
use samlguard_xml::{NodeId, XPath, XmlTree};
use std::collections::BTreeMap;
use std::fmt::Write;

/// A fresh `ID` value: `_` followed by 32 hex digits.
///
/// XML IDs may not start with a digit, hence the underscore.
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(33);
    id.push('_');
    for b in bytes {
        let _ = write!(id, "{b:02x}");
    }
    id
}

/// An element plus the table its paths resolve through.
#[derive(Debug, Clone, Copy)]
struct Scope<'t> {
    tree: &'t XmlTree,
    node: NodeId,
    table: &'t NamespaceTable,
}

impl<'t> Scope<'t> {
    fn expect_root(tree: &'t XmlTree, table: &'t NamespaceTable, namespace_uri: &str, local_name: &str) -> Result<Self, Error> {
        let node = tree.document_element();
        let scope = Self { tree, node, table };
        scope.expect(namespace_uri, local_name)?;
        Ok(scope)
    }

    fn expect(&self, namespace_uri: &str, local_name: &str) -> Result<(), Error> {
        match self.tree.element(self.node) {
            Some(e) if e.name.is(namespace_uri, local_name) => Ok(()),
            Some(e) => Err(Error::XmlStructure(format!(
                "expected {local_name}, found {}",
                redact::quote(&e.name.qualified())
            ))),
            None => Err(Error::XmlStructure(format!("expected {local_name}"))),
        }
    }

    fn attr(&self, name: &str) -> Option<&'t str> {
        self.tree.element(self.node)?.attribute(name)
    }

    fn values(&self, path: &str) -> Result<Vec<String>, Error> {
        let values = XPath::compile(path, self.table)?.select_values(self.tree, self.node);
        Ok(values.into_iter().map(|v| v.trim().to_owned()).collect())
    }

    fn value(&self, path: &str) -> Result<Option<String>, Error> {
        Ok(self.values(path)?.into_iter().next())
    }

    fn nodes(&self, path: &str) -> Result<Vec<NodeId>, Error> {
        XPath::compile(path, self.table)?.select_nodes(self.tree, self.node)
    }
}

/// `samlp:AuthnRequest`.
#[derive(Debug, Clone, Copy)]
pub struct AuthnRequestView<'t> {
    scope: Scope<'t>,
}

impl<'t> AuthnRequestView<'t> {
    pub fn new(tree: &'t XmlTree, table: &'t NamespaceTable) -> Result<Self, Error> {
        Ok(Self {
            scope: Scope::expect_root(tree, table, ns::SAMLP, ns::node::AUTHN_REQUEST)?,
        })
    }

    pub fn id(&self) -> Option<&'t str> {
        self.scope.attr(ns::attr::ID)
    }

    pub fn version(&self) -> Option<&'t str> {
        self.scope.attr("Version")
    }

    pub fn issue_instant(&self) -> Option<&'t str> {
        self.scope.attr("IssueInstant")
    }

    pub fn destination(&self) -> Option<&'t str> {
        self.scope.attr("Destination")
    }

    pub fn acs_url(&self) -> Option<&'t str> {
        self.scope.attr("AssertionConsumerServiceURL")
    }

    pub fn protocol_binding(&self) -> Option<&'t str> {
        self.scope.attr("ProtocolBinding")
    }

    pub fn provider_name(&self) -> Option<&'t str> {
        self.scope.attr("ProviderName")
    }

    pub fn issuer(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Issuer")
    }
}

/// `samlp:LogoutRequest`.
#[derive(Debug, Clone, Copy)]
pub struct LogoutRequestView<'t> {
    scope: Scope<'t>,
}

impl<'t> LogoutRequestView<'t> {
    pub fn new(tree: &'t XmlTree, table: &'t NamespaceTable) -> Result<Self, Error> {
        Ok(Self {
            scope: Scope::expect_root(tree, table, ns::SAMLP, ns::node::LOGOUT_REQUEST)?,
        })
    }

    pub fn id(&self) -> Option<&'t str> {
        self.scope.attr(ns::attr::ID)
    }

    pub fn issuer(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Issuer")
    }

    pub fn name_id(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:NameID")
    }

    pub fn name_id_format(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:NameID/@Format")
    }

    pub fn session_index(&self) -> Result<Option<String>, Error> {
        self.scope.value("samlp:SessionIndex")
    }
}

/// `samlp:Response`.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'t> {
    scope: Scope<'t>,
}

impl<'t> ResponseView<'t> {
    pub fn new(tree: &'t XmlTree, table: &'t NamespaceTable) -> Result<Self, Error> {
        Ok(Self {
            scope: Scope::expect_root(tree, table, ns::SAMLP, ns::node::RESPONSE)?,
        })
    }

    pub fn id(&self) -> Option<&'t str> {
        self.scope.attr(ns::attr::ID)
    }

    pub fn in_response_to(&self) -> Option<&'t str> {
        self.scope.attr("InResponseTo")
    }

    pub fn destination(&self) -> Option<&'t str> {
        self.scope.attr("Destination")
    }

    pub fn issuer(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Issuer")
    }

    pub fn status_code(&self) -> Result<Option<String>, Error> {
        self.scope.value("samlp:Status/samlp:StatusCode/@Value")
    }

    pub fn assertions(&self) -> Result<Vec<AssertionView<'t>>, Error> {
        Ok(self
            .scope
            .nodes("saml:Assertion")?
            .into_iter()
            .map(|node| AssertionView {
                scope: Scope { node, ..self.scope },
            })
            .collect())
    }
}

/// `saml:Assertion`.
#[derive(Debug, Clone, Copy)]
pub struct AssertionView<'t> {
    scope: Scope<'t>,
}

impl<'t> AssertionView<'t> {
    pub fn id(&self) -> Option<&'t str> {
        self.scope.attr(ns::attr::ID)
    }

    pub fn issuer(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Issuer")
    }

    pub fn name_id(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Subject/saml:NameID")
    }

    pub fn name_id_format(&self) -> Result<Option<String>, Error> {
        self.scope.value("saml:Subject/saml:NameID/@Format")
    }

    pub fn audiences(&self) -> Result<Vec<String>, Error> {
        self.scope
            .values("saml:Conditions/saml:AudienceRestriction/saml:Audience")
    }

    /// Attribute name to values, in document order per name.
    pub fn attributes(&self) -> Result<BTreeMap<String, Vec<String>>, Error> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.scope.nodes("saml:AttributeStatement/saml:Attribute")? {
            let attribute = Scope { node, ..self.scope };
            let Some(name) = attribute.attr(ns::attr::NAME) else {
                continue;
            };
            out.entry(name.to_owned())
                .or_default()
                .extend(attribute.values("saml:AttributeValue")?);
        }
        Ok(out)
    }
}

/// The assertions a tree offers.
///
/// A tree whose root is an Assertion (what a verified assertion signature
/// yields) exposes exactly that assertion. A Response exposes its direct
/// Assertion children.
pub fn assertions<'t>(tree: &'t XmlTree, table: &'t NamespaceTable) -> Result<Vec<AssertionView<'t>>, Error> {
    if let Ok(scope) = Scope::expect_root(tree, table, ns::SAML, ns::node::ASSERTION) {
        return Ok(vec![AssertionView { scope }]);
    }
    ResponseView::new(tree, table)?.assertions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use samlguard_xml::SafeXmlLoader;

    const RESPONSE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r" InResponseTo="_req" Destination="https://sp/acs">
  <saml:Issuer> https://idp </saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_a">
    <saml:Issuer>https://idp</saml:Issuer>
    <saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">alice@example.test</saml:NameID></saml:Subject>
    <saml:Conditions><saml:AudienceRestriction><saml:Audience>https://sp</saml:Audience></saml:AudienceRestriction></saml:Conditions>
    <saml:AttributeStatement>
      <saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue><saml:AttributeValue>ops</saml:AttributeValue></saml:Attribute>
      <saml:Attribute Name="mail"><saml:AttributeValue>alice@example.test</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#;

    #[test]
    fn test_response_view() {
        let tree = SafeXmlLoader::new().parse(RESPONSE).unwrap();
        let table = NamespaceTable::saml();
        let response = ResponseView::new(&tree, &table).unwrap();
        assert_eq!(response.id(), Some("_r"));
        assert_eq!(response.in_response_to(), Some("_req"));
        assert_eq!(response.destination(), Some("https://sp/acs"));
        assert_eq!(response.issuer().unwrap().as_deref(), Some("https://idp"));
        assert_eq!(
            response.status_code().unwrap().as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:status:Success")
        );

        let assertions = response.assertions().unwrap();
        assert_eq!(assertions.len(), 1);
        let assertion = assertions[0];
        assert_eq!(assertion.id(), Some("_a"));
        assert_eq!(assertion.name_id().unwrap().as_deref(), Some("alice@example.test"));
        assert_eq!(
            assertion.name_id_format().unwrap().as_deref(),
            Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress")
        );
        assert_eq!(assertion.audiences().unwrap(), vec!["https://sp"]);
        let attributes = assertion.attributes().unwrap();
        assert_eq!(attributes["role"], vec!["admin", "ops"]);
        assert_eq!(attributes["mail"], vec!["alice@example.test"]);
    }

    #[test]
    fn test_assertion_root() {
        let tree = SafeXmlLoader::new()
            .parse(r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_only"/>"#)
            .unwrap();
        let table = NamespaceTable::saml();
        let views = assertions(&tree, &table).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id(), Some("_only"));
        assert!(ResponseView::new(&tree, &table).is_err());
    }

    #[test]
    fn test_request_views() {
        let table = NamespaceTable::saml();
        let tree = SafeXmlLoader::new()
            .parse(concat!(
                r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" "#,
                r#"ID="_req" Version="2.0" IssueInstant="2024-01-01T00:00:00Z" ProviderName="SP" "#,
                r#"AssertionConsumerServiceURL="https://sp/acs" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST">"#,
                r#"<saml:Issuer>https://sp</saml:Issuer></samlp:AuthnRequest>"#
            ))
            .unwrap();
        let request = AuthnRequestView::new(&tree, &table).unwrap();
        assert_eq!(request.id(), Some("_req"));
        assert_eq!(request.version(), Some("2.0"));
        assert_eq!(request.issue_instant(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(request.provider_name(), Some("SP"));
        assert_eq!(request.acs_url(), Some("https://sp/acs"));
        assert_eq!(
            request.protocol_binding(),
            Some("urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST")
        );
        assert_eq!(request.destination(), None);
        assert_eq!(request.issuer().unwrap().as_deref(), Some("https://sp"));
        assert!(LogoutRequestView::new(&tree, &table).is_err());

        let tree = SafeXmlLoader::new()
            .parse(concat!(
                r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_lo">"#,
                r#"<saml:Issuer>https://sp</saml:Issuer><saml:NameID Format="urn:f">bob</saml:NameID>"#,
                r#"<samlp:SessionIndex>_s1</samlp:SessionIndex></samlp:LogoutRequest>"#
            ))
            .unwrap();
        let logout = LogoutRequestView::new(&tree, &table).unwrap();
        assert_eq!(logout.id(), Some("_lo"));
        assert_eq!(logout.name_id().unwrap().as_deref(), Some("bob"));
        assert_eq!(logout.name_id_format().unwrap().as_deref(), Some("urn:f"));
        assert_eq!(logout.session_index().unwrap().as_deref(), Some("_s1"));
    }

    #[test]
    fn test_view_needs_table_prefixes() {
        let tree = SafeXmlLoader::new().parse(RESPONSE).unwrap();
        let bare = NamespaceTable::new().with("samlp", ns::SAMLP);
        let response = ResponseView::new(&tree, &bare).unwrap();
        assert!(matches!(response.issuer(), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_random_id() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 33);
        assert!(a.starts_with('_'));
        assert!(a[1..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
