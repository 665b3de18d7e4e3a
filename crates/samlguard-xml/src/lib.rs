#![forbid(unsafe_code)]

//! XML tree, hardened loader and query surface for samlguard.
//!
//! [`SafeXmlLoader`] turns untrusted text into an immutable [`XmlTree`].
//! [`NodeSet`] and the reference helpers in [`xpath`] support signature
//! processing; [`query`] evaluates path expressions against a fixed
//! namespace table.

pub mod document;
pub mod escape;
pub mod loader;
pub mod nodeset;
pub mod query;
pub mod writer;
pub mod xpath;

pub use document::{Attribute, Element, NamespaceDecl, NodeId, NodeKind, QName, XmlTree};
pub use loader::{LoaderLimits, SafeXmlLoader};
pub use nodeset::NodeSet;
pub use query::{Match, XPath};
pub use writer::{Edits, XmlWriter};
