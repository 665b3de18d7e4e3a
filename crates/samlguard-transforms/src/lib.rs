#![forbid(unsafe_code)]

//! Transform pipeline for XML-DSig references.
//!
//! A reference selects a node set of the tree ([`uri`]), runs it through
//! its transforms ([`pipeline`]) and ends as canonical octets ready to be
//! digested. Only the enveloped-signature transform and the canonicalization
//! transforms are accepted.

pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use pipeline::{Transform, TransformData, TransformPipeline};
