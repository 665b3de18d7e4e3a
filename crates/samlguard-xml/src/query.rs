#![forbid(unsafe_code)]

//! Path queries resolved against a fixed namespace table.
//!
//! A small XPath subset, enough for protocol code to pull values out of a
//! verified tree:
//!
//! ```text
//! /samlp:Response/saml:Assertion[1]/saml:Subject/saml:NameID/text()
//! //saml:Attribute[@Name='mail']/saml:AttributeValue
//! saml:Conditions/saml:AudienceRestriction/saml:Audience
//! /samlp:AuthnRequest/@AssertionConsumerServiceURL
//! ```
//!
//! Prefixes are looked up in the caller's [`NamespaceTable`], never in the
//! document, and names are compared by namespace URI. A document that
//! binds `saml` to some other URI cannot make its elements match
//! `saml:Assertion`. Unprefixed names match elements in no namespace.

use crate::document::{NodeId, NodeKind, XmlTree};
use samlguard_core::{Error, NamespaceTable};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Namespace(String),
    Name {
        namespace_uri: Option<String>,
        local_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrName {
    namespace_uri: Option<String>,
    local_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    HasAttribute(AttrName),
    AttributeEquals(AttrName, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminal {
    Attribute(AttrName),
    Text,
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
    terminal: Option<Terminal>,
}

/// One result of evaluating a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match<'t> {
    Element(NodeId),
    Attribute { owner: NodeId, value: &'t str },
    Text { owner: NodeId, value: &'t str },
}

impl Match<'_> {
    /// String value: attribute value, text, or an element's text content.
    pub fn string_value(&self, tree: &XmlTree) -> String {
        match self {
            Match::Element(id) => tree.text_content(*id),
            Match::Attribute { value, .. } | Match::Text { value, .. } => (*value).to_owned(),
        }
    }
}

impl XPath {
    /// Compile `expr`, resolving every prefix through `table`.
    pub fn compile(expr: &str, table: &NamespaceTable) -> Result<Self, Error> {
        Parser {
            src: expr.trim(),
            pos: 0,
            table,
        }
        .parse()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Does this path end in `@attr` or `text()`?
    pub fn selects_values(&self) -> bool {
        self.terminal.is_some()
    }

    /// Evaluate relative to `context`. Absolute paths ignore the context.
    pub fn evaluate<'t>(&self, tree: &'t XmlTree, context: NodeId) -> Vec<Match<'t>> {
        let mut current = vec![if self.absolute { tree.root() } else { context }];

        for step in &self.steps {
            let mut next = Vec::new();
            for &ctx in &current {
                match step.axis {
                    Axis::Child => next.extend(matching_children(tree, ctx, step)),
                    // Positions count per parent, as `descendant-or-self::node()/child::x[n]`.
                    Axis::Descendant => {
                        for parent in std::iter::once(ctx).chain(tree.descendants(ctx)) {
                            if parent == ctx || tree.element(parent).is_some() {
                                next.extend(matching_children(tree, parent, step));
                            }
                        }
                    }
                    Axis::SelfNode => {
                        next.extend(apply_predicates(tree, vec![ctx], &step.predicates))
                    }
                }
            }
            // Arena ids follow document order.
            next.sort();
            next.dedup();
            current = next;
        }

        match &self.terminal {
            None => current.into_iter().map(Match::Element).collect(),
            Some(Terminal::Attribute(name)) => current
                .into_iter()
                .filter_map(|owner| {
                    attribute_value(tree, owner, name).map(|value| Match::Attribute { owner, value })
                })
                .collect(),
            Some(Terminal::Text) => current
                .into_iter()
                .flat_map(move |owner| {
                    tree.children(owner).filter_map(move |c| match tree.node_kind(c) {
                        Some(NodeKind::Text(t)) => Some(Match::Text { owner, value: t.as_str() }),
                        _ => None,
                    })
                })
                .collect(),
        }
    }

    /// Elements selected by this path. Fails for value-selecting paths.
    pub fn select_nodes(&self, tree: &XmlTree, context: NodeId) -> Result<Vec<NodeId>, Error> {
        if self.selects_values() {
            return Err(Error::InvalidPath(format!(
                "{} selects values, not elements",
                self.source
            )));
        }
        Ok(self
            .evaluate(tree, context)
            .into_iter()
            .filter_map(|m| match m {
                Match::Element(id) => Some(id),
                _ => None,
            })
            .collect())
    }

    /// String values of everything the path selects.
    pub fn select_values(&self, tree: &XmlTree, context: NodeId) -> Vec<String> {
        self.evaluate(tree, context)
            .iter()
            .map(|m| m.string_value(tree))
            .collect()
    }
}

impl NameTest {
    fn matches(&self, tree: &XmlTree, id: NodeId) -> bool {
        let Some(element) = tree.element(id) else {
            return false;
        };
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => element.name.namespace_uri.as_deref() == Some(uri.as_str()),
            NameTest::Name {
                namespace_uri,
                local_name,
            } => element.name.local_name == *local_name && element.name.namespace_uri == *namespace_uri,
        }
    }
}

fn attribute_value<'t>(tree: &'t XmlTree, owner: NodeId, name: &AttrName) -> Option<&'t str> {
    let element = tree.element(owner)?;
    match &name.namespace_uri {
        Some(uri) => element.attribute_ns(uri, &name.local_name),
        None => element.attribute(&name.local_name),
    }
}

fn matching_children(tree: &XmlTree, parent: NodeId, step: &Step) -> Vec<NodeId> {
    let candidates = tree
        .element_children(parent)
        .filter(|id| step.test.matches(tree, *id))
        .collect();
    apply_predicates(tree, candidates, &step.predicates)
}

fn apply_predicates(tree: &XmlTree, mut nodes: Vec<NodeId>, predicates: &[Predicate]) -> Vec<NodeId> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
            Predicate::HasAttribute(name) => nodes
                .into_iter()
                .filter(|id| attribute_value(tree, *id, name).is_some())
                .collect(),
            Predicate::AttributeEquals(name, expected) => nodes
                .into_iter()
                .filter(|id| attribute_value(tree, *id, name) == Some(expected.as_str()))
                .collect(),
        };
    }
    nodes
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    table: &'a NamespaceTable,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<XPath, Error> {
        if self.src.is_empty() {
            return Err(self.error("empty path"));
        }

        let mut absolute = false;
        let mut axis = Axis::Child;
        if self.eat("//") {
            absolute = true;
            axis = Axis::Descendant;
        } else if self.eat("/") {
            absolute = true;
        }

        let mut steps = Vec::new();
        let mut terminal = None;
        loop {
            if self.eat("@") {
                let (namespace_uri, local_name) = self.qname()?;
                terminal = Some(Terminal::Attribute(AttrName {
                    namespace_uri,
                    local_name,
                }));
            } else if self.eat("text()") {
                terminal = Some(Terminal::Text);
            } else {
                steps.push(self.step(axis)?);
            }

            if self.at_end() {
                break;
            }
            if terminal.is_some() {
                return Err(self.error("nothing may follow @attribute or text()"));
            }
            axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(self.error("expected '/'"));
            };
        }

        Ok(XPath {
            source: self.src.to_owned(),
            absolute,
            steps,
            terminal,
        })
    }

    fn step(&mut self, axis: Axis) -> Result<Step, Error> {
        if self.rest().starts_with('.') && !self.rest().starts_with("..") {
            self.pos += 1;
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NameTest::Any,
                predicates: Vec::new(),
            });
        }

        let token = self.name_token();
        let test = match token.split_once(':') {
            _ if token == "*" => NameTest::Any,
            Some((prefix, "*")) => NameTest::Namespace(self.resolve(prefix)?),
            Some((prefix, local)) => NameTest::Name {
                namespace_uri: Some(self.resolve(prefix)?),
                local_name: checked_local(local).ok_or_else(|| self.error("invalid name"))?,
            },
            None => NameTest::Name {
                namespace_uri: None,
                local_name: checked_local(token).ok_or_else(|| self.error("expected a name"))?,
            },
        };

        let mut predicates = Vec::new();
        while self.eat("[") {
            let predicate = if self.eat("@") {
                let (namespace_uri, local_name) = self.qname()?;
                let name = AttrName {
                    namespace_uri,
                    local_name,
                };
                if self.eat("=") {
                    Predicate::AttributeEquals(name, self.quoted()?)
                } else {
                    Predicate::HasAttribute(name)
                }
            } else {
                let digits: String = self.rest().chars().take_while(char::is_ascii_digit).collect();
                self.pos += digits.len();
                match digits.parse::<usize>() {
                    Ok(n) if n >= 1 => Predicate::Position(n),
                    _ => return Err(self.error("expected a position or @attribute predicate")),
                }
            };
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
            predicates.push(predicate);
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn qname(&mut self) -> Result<(Option<String>, String), Error> {
        let token = self.name_token();
        match token.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.resolve(prefix)?;
                let local = checked_local(local).ok_or_else(|| self.error("invalid name"))?;
                Ok((Some(uri), local))
            }
            None => {
                let local = checked_local(token).ok_or_else(|| self.error("expected a name"))?;
                Ok((None, local))
            }
        }
    }

    fn quoted(&mut self) -> Result<String, Error> {
        let quote = self
            .rest()
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| self.error("expected a quoted value"))?;
        self.pos += 1;
        let end = self
            .rest()
            .find(quote)
            .ok_or_else(|| self.error("unterminated string"))?;
        let value = self.rest()[..end].to_owned();
        self.pos += end + 1;
        Ok(value)
    }

    fn name_token(&mut self) -> &'a str {
        let rest: &'a str = &self.src[self.pos..];
        let len = rest
            .find(|c: char| matches!(c, '/' | '[' | ']' | '@' | '=') || c.is_whitespace())
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn resolve(&self, prefix: &str) -> Result<String, Error> {
        self.table
            .resolve(prefix)
            .map(str::to_owned)
            .ok_or_else(|| self.error(&format!("prefix '{prefix}' is not in the namespace table")))
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, msg: &str) -> Error {
        Error::InvalidPath(format!("{msg} at offset {} in '{}'", self.pos, self.src))
    }
}

fn checked_local(local: &str) -> Option<String> {
    let valid = !local.is_empty()
        && !local.contains(':')
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| local.to_owned())
}

// ── Tree conveniences ────────────────────────────────────────────────

impl XmlTree {
    /// Elements matching `path`, evaluated from the document node.
    pub fn select(&self, path: &str, table: &NamespaceTable) -> Result<Vec<NodeId>, Error> {
        XPath::compile(path, table)?.select_nodes(self, self.root())
    }

    /// Elements matching `path`, evaluated from `context`.
    pub fn select_from(
        &self,
        context: NodeId,
        path: &str,
        table: &NamespaceTable,
    ) -> Result<Vec<NodeId>, Error> {
        XPath::compile(path, table)?.select_nodes(self, context)
    }

    /// First element matching `path`.
    pub fn select_one(&self, path: &str, table: &NamespaceTable) -> Result<Option<NodeId>, Error> {
        Ok(self.select(path, table)?.into_iter().next())
    }

    /// String values of everything `path` selects.
    pub fn select_values(&self, path: &str, table: &NamespaceTable) -> Result<Vec<String>, Error> {
        Ok(XPath::compile(path, table)?.select_values(self, self.root()))
    }

    /// First string value `path` selects.
    pub fn select_text(&self, path: &str, table: &NamespaceTable) -> Result<Option<String>, Error> {
        Ok(self.select_values(path, table)?.into_iter().next())
    }

    /// Value of the un-namespaced attribute `name` on the first element
    /// matching `path`.
    pub fn select_attribute(
        &self,
        path: &str,
        name: &str,
        table: &NamespaceTable,
    ) -> Result<Option<String>, Error> {
        Ok(self
            .select_one(path, table)?
            .and_then(|id| self.element(id))
            .and_then(|e| e.attribute(name))
            .map(str::to_owned))
    }
}
