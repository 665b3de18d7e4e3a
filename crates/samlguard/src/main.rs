#![forbid(unsafe_code)]

//! samlguard CLI: verify, sign and query SAML documents.

use clap::{Parser, Subcommand};
use samlguard::core::algorithm;
use samlguard::dsig::SignContext;
use samlguard::xml::XPath;
use samlguard::{DocumentFlavor, Error, ParseOutcome, ParserConfig, SignatureVerifyingParser};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "samlguard",
    about = "Verify signed SAML documents and extract only the signed content",
    version
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct VerifyArgs {
    /// Document flavor: authn-request, logout-request, response, logout-response
    #[arg(short, long)]
    flavor: DocumentFlavor,

    /// Trusted signer certificate (PEM or DER)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Fall back to the certificate embedded in the signature (self-signed outcome)
    #[arg(long = "allow-embedded-cert")]
    allow_embedded_cert: bool,

    /// Accept SHA-1 digests and signatures
    #[arg(long = "allow-sha1")]
    allow_sha1: bool,

    /// Register additional ID attribute names
    #[arg(long = "id-attr")]
    id_attr: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a document and print the trusted tree
    Verify {
        /// Input XML file
        file: PathBuf,

        #[command(flatten)]
        args: VerifyArgs,
    },

    /// Sign a document or a signature template
    Sign {
        /// Document to sign (a template with empty DigestValue/SignatureValue
        /// unless --id is given)
        template: PathBuf,

        /// Private key (PKCS#8 or PKCS#1 PEM)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Certificate to embed in KeyInfo
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Insert a new enveloped signature over the element with this ID
        #[arg(long)]
        id: Option<String>,

        /// SignatureMethod algorithm URI used with --id
        #[arg(long = "signature-method", default_value = algorithm::RSA_SHA256)]
        signature_method: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a path against the verified tree
    Query {
        /// Input XML file
        file: PathBuf,

        /// Path expression, e.g. /saml:Assertion/saml:Subject/saml:NameID
        path: String,

        #[command(flatten)]
        args: VerifyArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Verify { file, args } => cmd_verify(&file, &args),
        Commands::Sign {
            template,
            key,
            cert,
            id,
            signature_method,
            output,
        } => cmd_sign(&template, &key, cert.as_deref(), id.as_deref(), &signature_method, output),
        Commands::Query { file, path, args } => cmd_query(&file, &path, &args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_verify(file: &Path, args: &VerifyArgs) -> Result<(), Error> {
    let tree = load(file, args)?;
    println!("{}", tree.to_xml_string()?);
    Ok(())
}

fn cmd_sign(
    template: &Path,
    key: &Path,
    cert: Option<&Path>,
    id: Option<&str>,
    signature_method: &str,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let xml = read_file(template)?;
    let mut ctx = SignContext::new(samlguard::keys::loader::load_signing_key_file(key)?);
    if let Some(path) = cert {
        ctx = ctx.with_certificate(samlguard::keys::load_certificate(path)?);
    }

    let signed = match id {
        Some(id) => samlguard::dsig::sign_enveloped(&ctx, &xml, id, signature_method)?,
        None => samlguard::dsig::sign(&ctx, &xml)?,
    };
    write_output(output, signed.as_bytes())
}

fn cmd_query(file: &Path, path: &str, args: &VerifyArgs) -> Result<(), Error> {
    let config = config_from(args);
    let compiled = XPath::compile(path, &config.namespaces)?;
    let tree = load(file, args)?;
    for value in compiled.select_values(&tree, tree.root()) {
        println!("{value}");
    }
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

/// Run the parser and report the outcome on stderr. Rejection exits 1.
fn load(file: &Path, args: &VerifyArgs) -> Result<samlguard::XmlTree, Error> {
    let raw = read_file(file)?;
    let trust = match &args.cert {
        Some(path) => Some(samlguard::keys::load_certificate(path)?),
        None => None,
    };

    let parser = SignatureVerifyingParser::with_config(args.flavor, config_from(args));
    let outcome = parser.load_outcome(&raw, trust.as_ref());
    match outcome {
        ParseOutcome::Rejected(kind) => {
            eprintln!("REJECTED: {kind}");
            process::exit(1);
        }
        other => {
            eprintln!("OK: {}", other.label());
            other
                .into_tree()
                .ok_or_else(|| Error::XmlStructure("outcome carries no tree".into()))
        }
    }
}

fn config_from(args: &VerifyArgs) -> ParserConfig {
    let mut config = ParserConfig::default()
        .allow_embedded_certificate(args.allow_embedded_cert)
        .allow_sha1(args.allow_sha1);
    for attr in &args.id_attr {
        config.add_id_attr(attr);
    }
    config
}

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    })
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data)
            .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", p.display())))),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(data)?;
            Ok(())
        }
    }
}
