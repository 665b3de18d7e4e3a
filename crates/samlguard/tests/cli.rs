use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

const FIXTURE: &str = "tests/data/response-signed-assertion.xml";
const IDP_CERT: &str = "tests/data/idp-rsa-cert.pem";
const IDP_CERT_DER: &str = "tests/data/idp-rsa-cert.der";
const IDP_KEY: &str = "tests/data/idp-rsa-key.pem";
const ROGUE_CERT: &str = "tests/data/rogue-rsa-cert.pem";

fn cmd() -> Command {
    Command::cargo_bin("samlguard").unwrap()
}

#[test]
fn verify_prints_signed_assertion() {
    cmd()
        .args(["verify", "--flavor", "response", "--cert", IDP_CERT, FIXTURE])
        .assert()
        .success()
        .stdout(contains(r#"ID="_assert1""#))
        .stdout(contains("alice@example.test"))
        .stdout(contains("samlp:Response").not())
        .stderr(contains("OK: verified"));
}

#[test]
fn verify_accepts_der_certificate() {
    cmd()
        .args(["verify", "-f", "Response", "--cert", IDP_CERT_DER, FIXTURE])
        .assert()
        .success()
        .stderr(contains("OK: verified"));
}

#[test]
fn verify_rejects_wrong_certificate() {
    cmd()
        .args(["verify", "--flavor", "response", "--cert", ROGUE_CERT, FIXTURE])
        .assert()
        .failure()
        .stderr(contains("REJECTED: signature-invalid"));
}

#[test]
fn verify_without_certificate() {
    cmd()
        .args(["verify", "--flavor", "response", FIXTURE])
        .assert()
        .failure()
        .stderr(contains("REJECTED: certificate-required"));
}

#[test]
fn unknown_flavor_is_a_usage_error() {
    cmd()
        .args(["verify", "--flavor", "assertion", FIXTURE])
        .assert()
        .failure()
        .stderr(contains("unknown document flavor"));
}

#[test]
fn missing_file_reports_error() {
    cmd()
        .args(["verify", "--flavor", "response", "tests/data/does-not-exist.xml"])
        .assert()
        .failure()
        .stderr(contains("Error:"));
}

#[test]
fn query_reads_from_verified_tree() {
    cmd()
        .args([
            "query",
            "--flavor",
            "response",
            "--cert",
            IDP_CERT,
            FIXTURE,
            "/saml:Assertion/saml:Subject/saml:NameID",
        ])
        .assert()
        .success()
        .stdout("alice@example.test\n");
}

#[test]
fn query_rejects_unknown_prefix() {
    cmd()
        .args(["query", "--flavor", "response", "--cert", IDP_CERT, FIXTURE, "/evil:Thing"])
        .assert()
        .failure()
        .stderr(contains("not in the namespace table"));
}

#[test]
fn sign_then_verify() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.xml");
    let output = dir.path().join("signed.xml");
    std::fs::write(
        &input,
        concat!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" "#,
            r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_lo1" Version="2.0">"#,
            r#"<saml:Issuer>https://sp.example.test</saml:Issuer><saml:NameID>dave</saml:NameID>"#,
            r#"</samlp:LogoutRequest>"#
        ),
    )
    .unwrap();

    cmd()
        .args(["sign", "--key", IDP_KEY, "--id", "_lo1", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    cmd()
        .args(["verify", "--flavor", "logout-request", "--cert", IDP_CERT])
        .arg(&output)
        .assert()
        .success()
        .stdout(contains("dave"))
        .stderr(contains("OK: verified"));

    // Self-signed only with the embedded certificate and the opt-in flag.
    let with_cert = dir.path().join("signed-with-cert.xml");
    cmd()
        .args(["sign", "--key", IDP_KEY, "--cert", IDP_CERT, "--id", "_lo1", "-o"])
        .arg(&with_cert)
        .arg(&input)
        .assert()
        .success();
    cmd()
        .args(["verify", "--flavor", "logout-request", "--allow-embedded-cert"])
        .arg(&with_cert)
        .assert()
        .success()
        .stderr(contains("OK: self-signed"));
}
