//! CSS selector subset evaluated against a [`DomSnapshot`].
//!
//! Supported: type, `*`, `#id`, `.class`, `[attr]`, `[attr=v]`, `^=`, `$=`,
//! `*=`, `~=`, `:not(<compound>)`, `:text-is("…")`, `:has-text("…")`,
//! `:visible`, descendant and `>` combinators, and comma lists.

use crate::dom::{DomNode, DomSnapshot, NodeId};
use crate::result::{HealError, HealResult};
use std::fmt;

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `=`
    Equals,
    /// `^=`
    Prefix,
    /// `$=`
    Suffix,
    /// `*=`
    Contains,
    /// `~=`
    Word,
}

/// `[name op value]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    /// Attribute name (lower-case)
    pub name: String,
    /// Operator and value; `None` tests presence only
    pub test: Option<(AttrOp, String)>,
}

impl AttrSelector {
    fn matches(&self, node: &DomNode) -> bool {
        let Some(actual) = node.attr(&self.name) else {
            return false;
        };
        match &self.test {
            None => true,
            Some((AttrOp::Equals, v)) => actual == v,
            Some((AttrOp::Prefix, v)) => !v.is_empty() && actual.starts_with(v.as_str()),
            Some((AttrOp::Suffix, v)) => !v.is_empty() && actual.ends_with(v.as_str()),
            Some((AttrOp::Contains, v)) => !v.is_empty() && actual.contains(v.as_str()),
            Some((AttrOp::Word, v)) => actual.split_whitespace().any(|w| w == v),
        }
    }
}

/// Pseudo-class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pseudo {
    /// `:not(compound)`
    Not(Box<Compound>),
    /// `:text-is("…")` exact trimmed rendered text
    TextIs(String),
    /// `:has-text("…")` case-insensitive substring of rendered text
    HasText(String),
    /// `:visible`
    Visible,
}

/// Sequence of simple selectors without combinators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Tag name; `None` for `*` or omitted
    pub tag: Option<String>,
    /// `#id`
    pub id: Option<String>,
    /// `.class` list
    pub classes: Vec<String>,
    /// Attribute tests
    pub attributes: Vec<AttrSelector>,
    /// Pseudo-classes
    pub pseudos: Vec<Pseudo>,
}

impl Compound {
    /// Whether `node` satisfies every part
    #[must_use]
    pub fn matches(&self, node: &DomNode) -> bool {
        if self.tag.as_ref().is_some_and(|t| *t != node.tag) {
            return false;
        }
        if self.id.as_ref().is_some_and(|id| node.attr("id") != Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| node.has_class(c)) {
            return false;
        }
        if !self.attributes.iter().all(|a| a.matches(node)) {
            return false;
        }
        self.pseudos.iter().all(|p| match p {
            Pseudo::Not(inner) => !inner.matches(node),
            Pseudo::TextIs(text) => collapse(&node.inner_text) == *text,
            Pseudo::HasText(text) => node
                .inner_text
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Pseudo::Visible => node.visible,
        })
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudos.is_empty()
    }

    /// Only a class list (no tag, id, attributes or pseudos)
    #[must_use]
    pub fn is_bare_class(&self) -> bool {
        !self.classes.is_empty()
            && self.tag.is_none()
            && self.id.is_none()
            && self.attributes.is_empty()
            && self.pseudos.is_empty()
    }
}

/// Relationship to the previous compound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace
    Descendant,
    /// `>`
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    // Combinator of the first entry is unused
    parts: Vec<(Combinator, Compound)>,
}

impl Complex {
    fn matches_at(&self, snapshot: &DomSnapshot, idx: usize, node: &DomNode) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => node
                .parent
                .and_then(|p| snapshot.node(p))
                .is_some_and(|p| self.matches_at(snapshot, idx - 1, p)),
            Combinator::Descendant => snapshot
                .ancestors(node.index)
                .any(|a| self.matches_at(snapshot, idx - 1, a)),
        }
    }
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    /// Parse a selector list
    pub fn parse(source: &str) -> HealResult<Self> {
        let mut parser = Parser::new(source);
        let alternatives = parser.parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    /// Original selector text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the node at `id` matches any alternative
    #[must_use]
    pub fn matches(&self, snapshot: &DomSnapshot, id: NodeId) -> bool {
        snapshot.node(id).is_some_and(|node| {
            self.alternatives
                .iter()
                .any(|c| c.matches_at(snapshot, c.parts.len() - 1, node))
        })
    }

    /// All matching nodes in document order
    #[must_use]
    pub fn query_all(&self, snapshot: &DomSnapshot) -> Vec<NodeId> {
        snapshot
            .iter()
            .map(|n| n.index)
            .filter(|id| self.matches(snapshot, *id))
            .collect()
    }

    /// Number of matching nodes
    #[must_use]
    pub fn count(&self, snapshot: &DomSnapshot) -> usize {
        self.query_all(snapshot).len()
    }

    /// Whether any part needs this engine (`:text-is`, `:has-text`, `:visible`)
    #[must_use]
    pub fn uses_extensions(&self) -> bool {
        fn compound_uses(c: &Compound) -> bool {
            c.pseudos.iter().any(|p| match p {
                Pseudo::Not(inner) => compound_uses(inner),
                _ => true,
            })
        }
        self.alternatives
            .iter()
            .flat_map(|c| c.parts.iter())
            .any(|(_, compound)| compound_uses(compound))
    }

    /// Single compound consisting only of classes
    #[must_use]
    pub fn is_bare_class(&self) -> bool {
        matches!(self.alternatives.as_slice(), [c] if c.parts.len() == 1 && c.parts[0].1.is_bare_class())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse `selector` and return matching nodes
pub fn query_all(snapshot: &DomSnapshot, selector: &str) -> HealResult<Vec<NodeId>> {
    Ok(Selector::parse(selector)?.query_all(snapshot))
}

/// Whether `value` can be written as a bare CSS identifier
#[must_use]
pub fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-' => {}
        _ => return false,
    }
    value != "-" && chars.all(is_ident_char)
}

/// Quote a string for use inside a selector
#[must_use]
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// `#id` when the id is a plain identifier, `[id="…"]` otherwise
#[must_use]
pub fn id_selector(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{id}")
    } else {
        attr_selector("id", id)
    }
}

/// `[name="value"]`
#[must_use]
pub fn attr_selector(name: &str, value: &str) -> String {
    format!("[{name}={}]", quote(value))
}

/// `tag:text-is("text")`
#[must_use]
pub fn text_is_selector(tag: &str, text: &str) -> String {
    format!("{tag}:text-is({})", quote(text))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> HealError {
        HealError::invalid_selector(self.source, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> HealResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}' at position {}", self.pos)))
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> HealResult<Vec<Complex>> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
        Ok(list)
    }

    fn parse_complex(&mut self) -> HealResult<Complex> {
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_space = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some(_) if had_space => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            };
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> HealResult<Compound> {
        let mut compound = Compound::default();
        let universal = self.eat('*');
        if !universal && self.peek().is_some_and(|c| c.is_alphabetic()) {
            compound.tag = Some(self.ident()?.to_lowercase());
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.pseudos.push(self.pseudo()?);
                }
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(self.error(format!("expected selector at position {}", self.pos)));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> HealResult<String> {
        let start = self.pos;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.peek() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                out.push(c);
            } else {
                break;
            }
            self.pos += 1;
        }
        if out.is_empty() {
            return Err(self.error(format!("expected identifier at position {start}")));
        }
        Ok(out)
    }

    fn string_or_ident(&mut self) -> HealResult<String> {
        let Some(quote) = self.peek().filter(|c| matches!(c, '"' | '\'')) else {
            return self.ident();
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    out.push(escaped);
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => out.push(c),
            }
            self.pos += 1;
        }
    }

    fn attribute(&mut self) -> HealResult<AttrSelector> {
        self.skip_ws();
        let name = self.ident()?.to_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector { name, test: None });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('^' | '$' | '*' | '~')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Contains,
                    _ => AttrOp::Word,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };
        self.skip_ws();
        let value = self.string_or_ident()?;
        self.skip_ws();
        self.expect(']')?;
        Ok(AttrSelector {
            name,
            test: Some((op, value)),
        })
    }

    fn pseudo(&mut self) -> HealResult<Pseudo> {
        let name = self.ident()?.to_lowercase();
        match name.as_str() {
            "visible" => Ok(Pseudo::Visible),
            "not" => {
                self.expect('(')?;
                self.skip_ws();
                let inner = self.parse_compound()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(Pseudo::Not(Box::new(inner)))
            }
            "text-is" | "has-text" => {
                self.expect('(')?;
                self.skip_ws();
                let text = self.string_or_ident()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(if name == "text-is" {
                    Pseudo::TextIs(collapse(&text))
                } else {
                    Pseudo::HasText(text)
                })
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{other}'"))),
        }
    }
}
