#![forbid(unsafe_code)]

//! Shared types for samlguard: errors, namespaces and algorithm URIs.

pub mod algorithm;
pub mod error;
pub mod ns;
pub mod redact;

pub use error::{Error, ErrorKind, Result};
pub use ns::NamespaceTable;

/// Errors returned from parsing and verification entry points.
pub type ParseError = Error;
