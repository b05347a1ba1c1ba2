//! CSS selector subset.
//!
//! Supports selector groups, descendant and child combinators, type and
//! universal selectors, `#id`, `.class`, attribute selectors with
//! `= ~= ^= $= *= |=`, and the structural pseudo-classes `:nth-of-type(n)`,
//! `:nth-child(n)`, `:first-child` and `:last-child`.

use crate::document::{Document, NodeId};
use crate::errors::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(Vec<ComplexSelector>);

#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    /// Compounds left to right; each carries the combinator joining it to
    /// the previous compound.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<AttrSelector>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    matcher: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
    DashMatch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pseudo {
    NthOfType(usize),
    NthChild(usize),
    FirstChild,
    LastChild,
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self, QueryError> {
        Parser::new(selector).parse_list()
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|complex| complex.matches(doc, node))
    }

    /// Matching elements in document order.
    pub fn select(&self, doc: &Document) -> Vec<NodeId> {
        doc.elements().filter(|id| self.matches(doc, *id)).collect()
    }
}

impl ComplexSelector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_at(doc, node, self.parts.len() - 1)
    }

    fn matches_at(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        let (combinator, compound) = &self.parts[index];
        if !compound.matches(doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc
                .parent_element(node)
                .map_or(false, |parent| self.matches_at(doc, parent, index - 1)),
            Combinator::Descendant => doc
                .ancestors(node)
                .any(|ancestor| self.matches_at(doc, ancestor, index - 1)),
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudos.is_empty()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if expected != "*" && expected != tag {
                return false;
            }
        }
        if !self
            .ids
            .iter()
            .all(|id| doc.attr(node, "id") == Some(id.as_str()))
        {
            return false;
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        if !self.attributes.iter().all(|attr| attr.matches(doc, node)) {
            return false;
        }
        self.pseudos.iter().all(|pseudo| pseudo.matches(doc, node))
    }
}

impl AttrSelector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(actual) = doc.attr(node, &self.name) else {
            return false;
        };
        let Some((op, expected)) = &self.matcher else {
            return true;
        };
        let expected = expected.as_str();
        match op {
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_whitespace().any(|token| token == expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
            AttrOp::DashMatch => {
                actual == expected || actual.starts_with(&format!("{expected}-"))
            }
        }
    }
}

impl Pseudo {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(parent) = doc.parent(node) else {
            return false;
        };
        let siblings: Vec<NodeId> = doc.element_children(parent).collect();
        match self {
            Pseudo::FirstChild => siblings.first() == Some(&node),
            Pseudo::LastChild => siblings.last() == Some(&node),
            Pseudo::NthChild(n) => siblings.get(n.wrapping_sub(1)) == Some(&node),
            Pseudo::NthOfType(n) => {
                let tag = doc.tag(node);
                siblings
                    .iter()
                    .filter(|sibling| doc.tag(**sibling) == tag)
                    .nth(n.wrapping_sub(1))
                    == Some(&node)
            }
        }
    }
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

    fn error(&self, reason: impl Into<String>) -> QueryError {
        QueryError::css(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, QueryError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            }
        }
        Ok(SelectorList(selectors))
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, QueryError> {
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some('+') | Some('~') => {
                    return Err(self.error("sibling combinators are not supported"))
                }
                Some(_) if had_space => Combinator::Descendant,
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            };
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(ComplexSelector { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, QueryError> {
        let mut compound = Compound::default();
        if self.eat('*') {
            compound.tag = Some("*".into());
        } else if self.peek().map_or(false, is_ident_start) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
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
        if compound.is_empty() {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String, QueryError> {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.pos += 1;
                match self.peek() {
                    Some(escaped) => {
                        out.push(escaped);
                        self.pos += 1;
                    }
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(ch) {
                out.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(out)
    }

    fn attribute(&mut self) -> Result<AttrSelector, QueryError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        if self.eat(']') {
            return Ok(AttrSelector {
                name,
                matcher: None,
            });
        }
        let op = match self.peek() {
            Some('=') => AttrOp::Equals,
            Some('~') => AttrOp::Includes,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Substring,
            Some('|') => AttrOp::DashMatch,
            _ => return Err(self.error("expected attribute operator")),
        };
        self.pos += 1;
        if op != AttrOp::Equals && !self.eat('=') {
            return Err(self.error("expected '='"));
        }
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated string")),
                        Some(ch) if ch == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some('\\') => {
                            self.pos += 1;
                            if let Some(escaped) = self.peek() {
                                value.push(escaped);
                                self.pos += 1;
                            }
                        }
                        Some(ch) => {
                            value.push(ch);
                            self.pos += 1;
                        }
                    }
                }
                value
            }
            _ => self.ident()?,
        };
        self.skip_whitespace();
        // case-sensitivity flags are accepted and ignored
        if matches!(self.peek(), Some('i' | 's')) {
            self.pos += 1;
            self.skip_whitespace();
        }
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(AttrSelector {
            name,
            matcher: Some((op, value)),
        })
    }

    fn pseudo(&mut self) -> Result<Pseudo, QueryError> {
        let name = self.ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Pseudo::FirstChild),
            "last-child" => Ok(Pseudo::LastChild),
            "nth-child" | "nth-of-type" => {
                if !self.eat('(') {
                    return Err(self.error("expected '('"));
                }
                self.skip_whitespace();
                let start = self.pos;
                while self.peek().map_or(false, |ch| ch.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let n = digits
                    .parse::<usize>()
                    .map_err(|_| self.error("only integer positions are supported"))?;
                self.skip_whitespace();
                if !self.eat(')') {
                    return Err(self.error("expected ')'"));
                }
                if n == 0 {
                    return Err(self.error("positions start at 1"));
                }
                Ok(if name == "nth-child" {
                    Pseudo::NthChild(n)
                } else {
                    Pseudo::NthOfType(n)
                })
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{other}'"))),
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}

/// Whether `value` can be written as a bare CSS identifier.
pub fn is_plain_ident(value: &str) -> bool {
    let mut chars = value.chars();
    if !chars.next().map_or(false, is_ident_start) {
        return false;
    }
    if let Some(rest) = value.strip_prefix('-') {
        if rest.starts_with(|ch: char| ch == '-' || ch.is_ascii_digit()) {
            return false;
        }
    }
    chars.all(is_ident_char)
}
