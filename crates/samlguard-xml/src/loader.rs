#![forbid(unsafe_code)]

//! Hardened XML parsing.
//!
//! The loader builds an [`XmlTree`] from untrusted text. It never resolves
//! anything: there is no entity table beyond the five predefined entities,
//! no DTD processing and no resolver of any kind, so parsing cannot touch
//! the filesystem or the network.
//!
//! A document type declaration is tolerated only when it is inert. An
//! external identifier (`SYSTEM` / `PUBLIC`), an entity declaration or a
//! parameter-entity reference is rejected as
//! [`Error::EntityRejected`]; attribute-list and notation declarations are
//! rejected as [`Error::DisallowedConstruct`] because honoring them would
//! change attribute values behind the canonicalizer's back.

use crate::document::{Attribute, Element, NamespaceDecl, QName, TreeBuilder, XmlTree};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};
use quick_xml::reader::NsReader;
use samlguard_core::{ns, Error};
use std::collections::HashSet;
use tracing::debug;

/// Structural bounds enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLimits {
    /// Maximum element nesting depth.
    pub max_depth: usize,
    /// Maximum number of nodes in the tree.
    pub max_nodes: usize,
    /// Maximum number of attributes (namespace declarations included) on one element.
    pub max_attributes: usize,
}

impl Default for LoaderLimits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_nodes: 1_000_000,
            max_attributes: 256,
        }
    }
}

/// Parser for untrusted XML.
#[derive(Debug, Clone, Default)]
pub struct SafeXmlLoader {
    limits: LoaderLimits,
}

impl SafeXmlLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: LoaderLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &LoaderLimits {
        &self.limits
    }

    /// Parse UTF-8 bytes.
    pub fn parse_bytes(&self, raw: &[u8]) -> Result<XmlTree, Error> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        self.parse(text)
    }

    /// Parse a document.
    pub fn parse(&self, raw: &str) -> Result<XmlTree, Error> {
        let result = self.parse_inner(raw.strip_prefix('\u{feff}').unwrap_or(raw));
        if let Err(e) = &result {
            debug!(kind = %e.kind(), error = %e, "document rejected by loader");
        }
        result
    }

    fn parse_inner(&self, text: &str) -> Result<XmlTree, Error> {
        let mut reader = NsReader::from_str(text);
        let mut builder = TreeBuilder::new();
        let mut seen_doctype = false;
        let mut seen_markup = false;

        loop {
            let step = reader
                .read_resolved_event()
                .map(|(resolved, event)| (owned_namespace(resolved), event));
            let (resolved, event) = match step {
                Ok(pair) => pair,
                Err(e) => {
                    return Err(Error::XmlParse(format!(
                        "{e} (near byte {})",
                        reader.buffer_position()
                    )))
                }
            };

            match event {
                Event::Decl(decl) => {
                    if seen_markup {
                        return Err(Error::XmlParse(
                            "XML declaration is only allowed at the start".into(),
                        ));
                    }
                    check_declaration(&decl)?;
                }
                Event::DocType(doctype) => {
                    if seen_doctype || builder.has_document_element() {
                        return Err(Error::XmlParse("misplaced document type declaration".into()));
                    }
                    seen_doctype = true;
                    inspect_doctype(utf8(&doctype)?)?;
                }
                Event::Start(start) => {
                    let element = self.build_element(&reader, &start, resolved?)?;
                    self.open(&mut builder, element)?;
                }
                Event::Empty(start) => {
                    let element = self.build_element(&reader, &start, resolved?)?;
                    self.open(&mut builder, element)?;
                    builder.close_element();
                }
                Event::End(_) => {
                    builder.close_element();
                }
                Event::Text(text) => {
                    let raw = utf8(&text)?;
                    if builder.depth() == 0 {
                        if !raw.chars().all(is_xml_whitespace) {
                            return Err(Error::XmlParse("text outside the root element".into()));
                        }
                    } else {
                        if raw.contains("]]>") {
                            return Err(Error::XmlParse("']]>' in character data".into()));
                        }
                        let normalized = normalize_newlines(raw);
                        let value = unescape(&normalized)?;
                        check_chars(&value, "text")?;
                        self.check_node_budget(&builder)?;
                        builder.text(&value);
                    }
                }
                Event::CData(cdata) => {
                    if builder.depth() == 0 {
                        return Err(Error::XmlParse("CDATA outside the root element".into()));
                    }
                    let raw = utf8(&cdata)?;
                    check_chars(raw, "CDATA section")?;
                    self.check_node_budget(&builder)?;
                    builder.text(&normalize_newlines(raw));
                }
                Event::Comment(comment) => {
                    let raw = utf8(&comment)?;
                    check_chars(raw, "comment")?;
                    self.check_node_budget(&builder)?;
                    builder.comment(&normalize_newlines(raw));
                }
                Event::PI(pi) => {
                    let target = utf8(pi.target())?;
                    if !is_name(target) {
                        return Err(Error::XmlParse(format!(
                            "invalid processing instruction target {target:?}"
                        )));
                    }
                    if target.eq_ignore_ascii_case("xml") {
                        return Err(Error::XmlParse("reserved processing instruction target".into()));
                    }
                    let content = utf8(pi.content())?.trim_start();
                    check_chars(content, "processing instruction")?;
                    let data = if content.is_empty() {
                        None
                    } else {
                        Some(normalize_newlines(content))
                    };
                    self.check_node_budget(&builder)?;
                    builder.processing_instruction(target, data.as_deref());
                }
                Event::Eof => break,
            }
            seen_markup = true;
        }

        if builder.depth() > 0 {
            return Err(Error::XmlParse("unexpected end of document: unclosed element".into()));
        }
        builder
            .finish()
            .ok_or_else(|| Error::XmlParse("document has no root element".into()))
    }

    fn open(&self, builder: &mut TreeBuilder, element: Element) -> Result<(), Error> {
        if builder.depth() == 0 && builder.has_document_element() {
            return Err(Error::XmlParse("more than one root element".into()));
        }
        if builder.depth() >= self.limits.max_depth {
            return Err(Error::LimitExceeded(format!(
                "element nesting deeper than {}",
                self.limits.max_depth
            )));
        }
        self.check_node_budget(builder)?;
        builder.open_element(element);
        Ok(())
    }

    fn check_node_budget(&self, builder: &TreeBuilder) -> Result<(), Error> {
        if builder.node_count() >= self.limits.max_nodes {
            return Err(Error::LimitExceeded(format!(
                "more than {} nodes",
                self.limits.max_nodes
            )));
        }
        Ok(())
    }

    fn build_element(
        &self,
        reader: &NsReader<&[u8]>,
        start: &BytesStart<'_>,
        namespace_uri: Option<String>,
    ) -> Result<Element, Error> {
        let qname = start.name();
        check_qname(utf8(qname.as_ref())?)?;
        let prefix = qname.prefix().map(|p| utf8(p.as_ref()).map(str::to_owned)).transpose()?;
        let local_name = utf8(qname.local_name().as_ref())?.to_owned();

        let mut attributes = Vec::new();
        let mut namespace_declarations = Vec::new();
        let mut count = 0usize;

        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::XmlParse(format!("malformed attribute: {e}")))?;
            count += 1;
            if count > self.limits.max_attributes {
                return Err(Error::LimitExceeded(format!(
                    "more than {} attributes on one element",
                    self.limits.max_attributes
                )));
            }
            check_qname(utf8(attr.key.as_ref())?)?;
            let value = normalize_attribute_value(utf8(&attr.value)?)?;
            check_chars(&value, "attribute value")?;

            match attr.key.as_namespace_binding() {
                Some(PrefixDeclaration::Default) => {
                    namespace_declarations.push(NamespaceDecl {
                        prefix: String::new(),
                        uri: value,
                    });
                }
                Some(PrefixDeclaration::Named(p)) => {
                    if value.is_empty() {
                        return Err(Error::XmlParse("prefixed namespace undeclared".into()));
                    }
                    namespace_declarations.push(NamespaceDecl {
                        prefix: utf8(p)?.to_owned(),
                        uri: value,
                    });
                }
                None => {
                    let attr_prefix = attr
                        .key
                        .prefix()
                        .map(|p| utf8(p.as_ref()).map(str::to_owned))
                        .transpose()?;
                    let attr_local = utf8(attr.key.local_name().as_ref())?.to_owned();
                    let attr_ns = match attr_prefix.as_deref() {
                        None => None,
                        Some("xml") => Some(ns::XML.to_owned()),
                        Some(_) => owned_namespace(reader.resolve_attribute(attr.key).0)?,
                    };
                    attributes.push(Attribute {
                        name: QName {
                            prefix: attr_prefix,
                            local_name: attr_local,
                            namespace_uri: attr_ns,
                        },
                        value,
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for attr in &attributes {
            let key = (attr.name.namespace_uri.as_deref(), attr.name.local_name.as_str());
            if !seen.insert(key) {
                return Err(Error::XmlParse("duplicate attribute after namespace resolution".into()));
            }
        }

        Ok(Element {
            name: QName {
                prefix,
                local_name,
                namespace_uri,
            },
            attributes,
            namespace_declarations,
        })
    }
}

/// Turn a borrowed resolution result into an owned namespace URI.
fn owned_namespace(resolved: ResolveResult<'_>) -> Result<Option<String>, Error> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(utf8(namespace.as_ref())?.to_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(_) => Err(Error::XmlParse("unbound namespace prefix".into())),
    }
}

fn check_declaration(decl: &BytesDecl<'_>) -> Result<(), Error> {
    let version = decl
        .version()
        .map_err(|e| Error::XmlParse(format!("XML declaration: {e}")))?;
    if &*version != b"1.0" {
        return Err(Error::XmlParse("only XML 1.0 documents are accepted".into()));
    }
    if let Some(encoding) = decl.encoding() {
        let encoding = encoding.map_err(|e| Error::XmlParse(format!("XML declaration: {e}")))?;
        let encoding = utf8(&encoding)?;
        if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
            return Err(Error::XmlParse("only UTF-8 documents are accepted".into()));
        }
    }
    Ok(())
}

/// Decide whether a document type declaration is inert.
///
/// `content` is everything between `<!DOCTYPE` and the closing `>`.
fn inspect_doctype(content: &str) -> Result<(), Error> {
    let content = content.trim_start();
    let (head, subset) = match content.find('[') {
        Some(i) => (&content[..i], Some(&content[i + 1..])),
        None => (content, None),
    };

    if head
        .split_whitespace()
        .skip(1)
        .any(|token| token == "SYSTEM" || token == "PUBLIC")
    {
        return Err(Error::EntityRejected("external DTD reference".into()));
    }

    if let Some(subset) = subset {
        let upper = subset.to_ascii_uppercase();
        if upper.contains("<!ENTITY") {
            return Err(Error::EntityRejected("entity declaration in DTD".into()));
        }
        if subset.contains('%') {
            return Err(Error::EntityRejected("parameter entity reference in DTD".into()));
        }
        if upper.contains("<!ATTLIST") || upper.contains("<!NOTATION") {
            return Err(Error::DisallowedConstruct(
                "attribute-list or notation declaration in DTD".into(),
            ));
        }
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))
}

/// XML 1.0 `Char`.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn check_chars(value: &str, context: &str) -> Result<(), Error> {
    match value.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(Error::XmlParse(format!(
            "character U+{:04X} not allowed in {context}",
            c as u32
        ))),
        None => Ok(()),
    }
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// XML 1.0 `Name`.
fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

/// Element and attribute names: `NCName` or `NCName ':' NCName`.
fn check_qname(name: &str) -> Result<(), Error> {
    let is_ncname = |part: &str| !part.contains(':') && is_name(part);
    let valid = match name.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(name),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::XmlParse(format!("invalid name {name:?}")))
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// XML 1.0 §2.11 end-of-line handling.
fn normalize_newlines(raw: &str) -> String {
    if !raw.contains('\r') {
        return raw.to_owned();
    }
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// XML 1.0 §3.3.3 attribute-value normalization for CDATA attributes.
///
/// Literal whitespace becomes a space before references are decoded, so
/// `&#xA;` survives as a newline.
fn normalize_attribute_value(raw: &str) -> Result<String, Error> {
    if raw.contains('<') {
        return Err(Error::XmlParse("'<' in attribute value".into()));
    }
    let mut normalized = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                normalized.push(' ');
            }
            '\n' | '\t' => normalized.push(' '),
            c => normalized.push(c),
        }
    }
    unescape(&normalized)
}

/// Decode predefined entities and character references. Any other entity
/// reference is an error: nothing is ever looked up.
fn unescape(raw: &str) -> Result<String, Error> {
    if !raw.contains('&') {
        return Ok(raw.to_owned());
    }
    quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .map_err(|e| Error::XmlParse(format!("invalid reference: {e}")))
}
