//! End-to-end behavior of the verifying parser against hostile inputs.

use samlguard::core::{algorithm, ns};
use samlguard::dsig::{sign_enveloped, SignContext};
use samlguard::keys::load_signing_key_pem;
use samlguard::saml::{assertions, AuthnRequestView};
use samlguard::{
    DocumentFlavor, ErrorKind, LoaderLimits, NamespaceTable, ParseOutcome, ParserConfig, SignatureVerifyingParser,
    TrustCertificate, XmlTree,
};

const SIGNED_RESPONSE: &str = include_str!("data/response-signed-assertion.xml");
const IDP_KEY: &str = include_str!("data/idp-rsa-key.pem");
const IDP_CERT: &str = include_str!("data/idp-rsa-cert.pem");
const ROGUE_KEY: &str = include_str!("data/rogue-rsa-key.pem");
const ROGUE_CERT: &str = include_str!("data/rogue-rsa-cert.pem");

const UNSIGNED_RESPONSE: &str = concat!(
    r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" "#,
    r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp" Version="2.0">"#,
    r#"<saml:Issuer>https://idp.example.test</saml:Issuer>"#,
    r#"<saml:Assertion ID="_a1" Version="2.0"><saml:Issuer>https://idp.example.test</saml:Issuer>"#,
    r#"<saml:Subject><saml:NameID>carol@example.test</saml:NameID></saml:Subject></saml:Assertion>"#,
    r#"</samlp:Response>"#
);

const UNSIGNED_REQUEST: &str = concat!(
    r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" "#,
    r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_req" Version="2.0" "#,
    r#"AssertionConsumerServiceURL="https://sp.example.test/acs">"#,
    r#"<saml:Issuer>https://sp.example.test</saml:Issuer></samlp:AuthnRequest>"#
);

fn idp_cert() -> TrustCertificate {
    TrustCertificate::from_pem(IDP_CERT).unwrap()
}

fn response_parser() -> SignatureVerifyingParser {
    SignatureVerifyingParser::new(DocumentFlavor::Response)
}

fn sign_with(key_pem: &str, cert_pem: Option<&str>, doc: &str, id: &str, method: &str) -> String {
    let mut ctx = SignContext::new(load_signing_key_pem(key_pem).unwrap());
    if let Some(pem) = cert_pem {
        ctx = ctx.with_certificate(TrustCertificate::from_pem(pem).unwrap());
    }
    sign_enveloped(&ctx, doc, id, method).unwrap()
}

/// The `<saml:Assertion ID="_assert1">...</saml:Assertion>` markup of the fixture.
fn signed_assertion_markup() -> &'static str {
    let start = SIGNED_RESPONSE.find(r#"<saml:Assertion ID="_assert1""#).unwrap();
    let end = SIGNED_RESPONSE.rfind("</saml:Assertion>").unwrap() + "</saml:Assertion>".len();
    &SIGNED_RESPONSE[start..end]
}

fn signature_markup() -> &'static str {
    let start = SIGNED_RESPONSE.find("<ds:Signature").unwrap();
    let end = SIGNED_RESPONSE.find("</ds:Signature>").unwrap() + "</ds:Signature>".len();
    &SIGNED_RESPONSE[start..end]
}

fn name_ids(tree: &XmlTree) -> Vec<String> {
    tree.select_values("//saml:NameID", &NamespaceTable::saml()).unwrap()
}

#[test]
fn verified_outcome_contains_only_the_signed_assertion() {
    let cert = idp_cert();
    let outcome = response_parser().load(SIGNED_RESPONSE, Some(&cert)).unwrap();
    let ParseOutcome::Verified(tree) = &outcome else {
        panic!("expected Verified, got {}", outcome.label());
    };
    let table = NamespaceTable::saml();
    let views = assertions(tree, &table).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id(), Some("_assert1"));
    assert_eq!(views[0].name_id().unwrap().as_deref(), Some("alice@example.test"));
    // Response-level content sits outside the signed assertion.
    assert!(tree.find_element(ns::SAMLP, ns::node::RESPONSE).is_none());
}

#[test]
fn injected_sibling_assertion_is_not_trusted() {
    let evil = r#"<saml:Assertion ID="_evil"><saml:Subject><saml:NameID>admin@example.test</saml:NameID></saml:Subject></saml:Assertion>"#;
    let after = SIGNED_RESPONSE.replace("</samlp:Response>", &format!("{evil}</samlp:Response>"));
    let before = SIGNED_RESPONSE.replace(r#"<saml:Assertion ID="_assert1""#, &format!(r#"{evil}<saml:Assertion ID="_assert1""#));

    let cert = idp_cert();
    for doc in [after, before] {
        let outcome = response_parser().load(&doc, Some(&cert)).unwrap();
        assert!(outcome.is_verified());
        let tree = outcome.tree().unwrap();
        assert_eq!(name_ids(tree), vec!["alice@example.test"]);
    }
}

#[test]
fn assertion_relocated_into_extensions_with_copied_signature() {
    // The genuine assertion is hidden in Extensions; a forged one carries
    // a copy of its signature.
    let forged = format!(
        r#"<saml:Assertion ID="_forged"><saml:Issuer>https://idp.example.test</saml:Issuer>{}<saml:Subject><saml:NameID>admin@example.test</saml:NameID></saml:Subject></saml:Assertion>"#,
        signature_markup()
    );
    let doc = SIGNED_RESPONSE.replace(
        signed_assertion_markup(),
        &format!("<samlp:Extensions>{}</samlp:Extensions>{forged}", signed_assertion_markup()),
    );
    let cert = idp_cert();
    let outcome = response_parser().load_outcome(&doc, Some(&cert));
    assert_eq!(outcome, ParseOutcome::Rejected(ErrorKind::SignatureInvalid));
}

#[test]
fn assertion_relocated_into_extensions_with_duplicate_id() {
    let forged = format!(
        r#"<saml:Assertion ID="_assert1"><saml:Issuer>https://idp.example.test</saml:Issuer>{}<saml:Subject><saml:NameID>admin@example.test</saml:NameID></saml:Subject></saml:Assertion>"#,
        signature_markup()
    );
    let doc = SIGNED_RESPONSE.replace(
        signed_assertion_markup(),
        &format!("<samlp:Extensions>{}</samlp:Extensions>{forged}", signed_assertion_markup()),
    );
    let cert = idp_cert();
    let outcome = response_parser().load_outcome(&doc, Some(&cert));
    assert_eq!(outcome, ParseOutcome::Rejected(ErrorKind::SignatureInvalid));
}

#[test]
fn assertion_relocated_into_extensions_without_signature_is_unsigned() {
    let forged = r#"<saml:Assertion ID="_forged"><saml:Subject><saml:NameID>admin@example.test</saml:NameID></saml:Subject></saml:Assertion>"#;
    let doc = SIGNED_RESPONSE.replace(
        signed_assertion_markup(),
        &format!("<samlp:Extensions>{}</samlp:Extensions>{forged}", signed_assertion_markup()),
    );
    let cert = idp_cert();
    let outcome = response_parser().load(&doc, Some(&cert)).unwrap();
    assert_eq!(outcome.label(), "unsigned");
    assert!(!outcome.is_verified());
}

#[test]
fn digest_mismatch_is_rejected() {
    let doc = SIGNED_RESPONSE.replace("alice@example.test", "admin@example.test");
    let cert = idp_cert();
    let err = response_parser().load(&doc, Some(&cert)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[test]
fn wrong_certificate_is_rejected() {
    let rogue = TrustCertificate::from_pem(ROGUE_CERT).unwrap();
    let outcome = response_parser().load_outcome(SIGNED_RESPONSE, Some(&rogue));
    assert_eq!(outcome, ParseOutcome::Rejected(ErrorKind::SignatureInvalid));
}

#[test]
fn keyinfo_is_ignored_when_a_trust_anchor_is_given() {
    // Signed by the rogue key, which also embeds its own certificate.
    let doc = sign_with(ROGUE_KEY, Some(ROGUE_CERT), UNSIGNED_RESPONSE, "_a1", algorithm::RSA_SHA256);
    let cert = idp_cert();
    let outcome = response_parser().load_outcome(&doc, Some(&cert));
    assert_eq!(outcome, ParseOutcome::Rejected(ErrorKind::SignatureInvalid));
}

#[test]
fn external_entity_is_never_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let secret = dir.path().join("secret.txt");
    std::fs::write(&secret, "TOP-SECRET-MARKER").unwrap();
    let doc = format!(
        r#"<?xml version="1.0"?><!DOCTYPE r [<!ENTITY xxe SYSTEM "file://{}">]><samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">&xxe;</samlp:Response>"#,
        secret.display()
    );

    let err = response_parser().load(&doc, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansionRejected);
    assert!(!err.to_string().contains("TOP-SECRET-MARKER"));

    let external_dtd = format!(
        r#"<!DOCTYPE r SYSTEM "file://{}"><samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#,
        secret.display()
    );
    assert_eq!(
        response_parser().load_outcome(&external_dtd, None),
        ParseOutcome::Rejected(ErrorKind::EntityExpansionRejected)
    );
}

#[test]
fn billion_laughs_is_rejected_before_expansion() {
    let mut doc = String::from("<?xml version=\"1.0\"?>\n<!DOCTYPE lolz [\n<!ENTITY lol0 \"lol\">\n");
    for i in 1..10 {
        doc.push_str(&format!("<!ENTITY lol{i} \"{}\">\n", format!("&lol{};", i - 1).repeat(10)));
    }
    doc.push_str("]>\n<lolz>&lol9;</lolz>\n<!--");
    while doc.len() < 10 * 1024 * 1024 {
        doc.push_str("padding padding padding padding padding padding padding padding\n");
    }
    doc.push_str("-->");

    let err = response_parser().load(&doc, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansionRejected);
}

#[test]
fn unsigned_document_passes_through_whole() {
    let parser = SignatureVerifyingParser::new(DocumentFlavor::AuthnRequest);
    let outcome = parser.load(UNSIGNED_REQUEST, Some(&idp_cert())).unwrap();
    let ParseOutcome::Unsigned(tree) = outcome else {
        panic!("expected Unsigned");
    };
    let table = NamespaceTable::saml();
    let view = AuthnRequestView::new(&tree, &table).unwrap();
    assert_eq!(view.id(), Some("_req"));
    assert_eq!(view.acs_url(), Some("https://sp.example.test/acs"));
    assert_eq!(view.issuer().unwrap().as_deref(), Some("https://sp.example.test"));
}

#[test]
fn loading_is_idempotent() {
    let cert = idp_cert();
    let parser = response_parser();
    let first = parser.load(SIGNED_RESPONSE, Some(&cert)).unwrap();
    let second = parser.load(SIGNED_RESPONSE, Some(&cert)).unwrap();
    assert_eq!(first, second);

    // The verified tree serializes to exactly the signed octets' document.
    let again = first.tree().unwrap().to_xml_string().unwrap();
    let reparsed = samlguard::SafeXmlLoader::new().parse(&again).unwrap();
    assert_eq!(&reparsed, first.tree().unwrap());
}

#[test]
fn embedded_certificate_requires_opt_in() {
    let doc = sign_with(IDP_KEY, Some(IDP_CERT), UNSIGNED_RESPONSE, "_a1", algorithm::RSA_SHA256);

    assert_eq!(
        response_parser().load_outcome(&doc, None),
        ParseOutcome::Rejected(ErrorKind::CertificateRequired)
    );

    let config = ParserConfig::default().allow_embedded_certificate(true);
    let parser = SignatureVerifyingParser::with_config(DocumentFlavor::Response, config);
    let outcome = parser.load(&doc, None).unwrap();
    assert_eq!(outcome.label(), "self-signed");
    assert!(!outcome.is_verified());

    // A trust anchor always wins over the embedded certificate.
    let outcome = parser.load(&doc, Some(&idp_cert())).unwrap();
    assert!(outcome.is_verified());
}

#[test]
fn sha1_requires_opt_in() {
    let doc = sign_with(IDP_KEY, None, UNSIGNED_RESPONSE, "_a1", algorithm::RSA_SHA1);
    let cert = idp_cert();

    assert_eq!(
        response_parser().load_outcome(&doc, Some(&cert)),
        ParseOutcome::Rejected(ErrorKind::UnsupportedAlgorithm)
    );

    let parser = SignatureVerifyingParser::with_config(DocumentFlavor::Response, ParserConfig::default().allow_sha1(true));
    assert!(parser.load(&doc, Some(&cert)).unwrap().is_verified());
}

#[test]
fn duplicate_ids_are_rejected() {
    let doc = SIGNED_RESPONSE.replace(r#"ID="_resp1""#, r#"ID="_assert1""#);
    let cert = idp_cert();
    assert_eq!(
        response_parser().load_outcome(&doc, Some(&cert)),
        ParseOutcome::Rejected(ErrorKind::SignatureInvalid)
    );
}

#[test]
fn unsupported_transform_is_rejected() {
    let doc = SIGNED_RESPONSE.replace(
        "http://www.w3.org/2000/09/xmldsig#enveloped-signature",
        "http://www.w3.org/TR/1999/REC-xslt-19991116",
    );
    let cert = idp_cert();
    assert_eq!(
        response_parser().load_outcome(&doc, Some(&cert)),
        ParseOutcome::Rejected(ErrorKind::UnsupportedAlgorithm)
    );
}

#[test]
fn whole_response_signature() {
    let doc = sign_with(IDP_KEY, None, UNSIGNED_RESPONSE, "_resp", algorithm::RSA_SHA256);
    let cert = idp_cert();
    let outcome = response_parser().load(&doc, Some(&cert)).unwrap();
    let tree = outcome.tree().unwrap();
    assert!(outcome.is_verified());
    assert!(tree
        .element(tree.document_element())
        .unwrap()
        .name
        .is(ns::SAMLP, ns::node::RESPONSE));
    assert_eq!(name_ids(tree), vec!["carol@example.test"]);
}

#[test]
fn whole_document_reference_on_request() {
    let doc = sign_with(IDP_KEY, None, UNSIGNED_REQUEST, "", algorithm::RSA_SHA256);
    let cert = idp_cert();
    let parser = SignatureVerifyingParser::new(DocumentFlavor::AuthnRequest);
    let outcome = parser.load(&doc, Some(&cert)).unwrap();
    assert!(outcome.is_verified());
    let tree = outcome.tree().unwrap();
    assert!(tree.find_element(ns::DSIG, ns::node::SIGNATURE).is_none());
    assert_eq!(
        tree.select_attribute("/samlp:AuthnRequest", "ID", &NamespaceTable::saml()).unwrap(),
        Some("_req".to_owned())
    );
}

#[test]
fn wrong_root_for_flavor() {
    let parser = SignatureVerifyingParser::new(DocumentFlavor::LogoutRequest);
    assert_eq!(
        parser.load_outcome(UNSIGNED_REQUEST, None),
        ParseOutcome::Rejected(ErrorKind::MalformedDocument)
    );
}

#[test]
fn depth_limit_applies() {
    let mut doc = String::from(r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">"#);
    doc.push_str(&"<a>".repeat(40));
    doc.push_str(&"</a>".repeat(40));
    doc.push_str("</samlp:Response>");

    let limits = LoaderLimits {
        max_depth: 16,
        ..LoaderLimits::default()
    };
    let parser = SignatureVerifyingParser::with_config(DocumentFlavor::Response, ParserConfig::default().limits(limits));
    assert_eq!(
        parser.load_outcome(&doc, None),
        ParseOutcome::Rejected(ErrorKind::MalformedDocument)
    );
    assert!(response_parser().load(&doc, None).is_ok());
}
