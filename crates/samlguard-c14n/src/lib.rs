#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) over samlguard trees.
//!
//! Implements the four W3C variants a SAML signature may name:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)

pub mod exclusive;
pub mod inclusive;
pub mod render;

use samlguard_core::{algorithm, Error};
use samlguard_xml::{NodeId, NodeSet, XmlTree};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize a tree.
///
/// - `node_set`: optional node set for document-subset canonicalization;
///   `None` renders the whole document
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces PrefixList
pub fn canonicalize(
    tree: &XmlTree,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    if mode.is_exclusive() {
        exclusive::canonicalize(tree, mode.with_comments(), node_set, inclusive_prefixes)
    } else {
        inclusive::canonicalize(tree, mode.with_comments(), node_set)
    }
}

/// Canonicalize the subtree rooted at `node`.
///
/// Comments inside the subtree are kept only for the `WithComments` modes.
pub fn canonicalize_subtree(
    tree: &XmlTree,
    node: NodeId,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let node_set = if mode.with_comments() {
        NodeSet::tree_with_comments(node, tree)
    } else {
        NodeSet::tree_without_comments(node, tree)
    };
    canonicalize(tree, mode, Some(&node_set), inclusive_prefixes)
}
