//! XPath 1.0 subset over element nodes.
//!
//! Location paths use `/`, `//`, `.`, `..`, `*` and tag name tests.
//! Predicates support positions, `last()`, `position()`, attribute tests,
//! `text()`, `normalize-space()`, `contains()`, `starts-with()`,
//! `concat()`, `not()`, `=`/`!=`, `and`/`or` and parentheses. Paths may be
//! combined with `|`.

use std::collections::BTreeSet;

use crate::document::{normalize_whitespace, Document, NodeId};
use crate::errors::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    paths: Vec<Path>,
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    /// Preceded by `//`: the context is widened to descendant-or-self first.
    descend: bool,
    kind: StepKind,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
enum StepKind {
    Child(Option<String>),
    Parent,
    Current,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(String),
    Number(f64),
    Attr(String),
    Text,
    Context,
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        right: Box<Expr>,
        negate: bool,
    },
    NormalizeSpace(Option<Box<Expr>>),
    Contains(Box<Expr>, Box<Expr>),
    StartsWith(Box<Expr>, Box<Expr>),
    Concat(Vec<Expr>),
    Not(Box<Expr>),
    Last,
    Position,
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self, QueryError> {
        let tokens = lex(expr)?;
        Parser {
            source: expr,
            tokens,
            pos: 0,
        }
        .parse_union()
    }

    /// Matching elements, deduplicated, in document order.
    pub fn select(&self, doc: &Document) -> Vec<NodeId> {
        let mut out = BTreeSet::new();
        for path in &self.paths {
            out.extend(path.evaluate(doc));
        }
        out.into_iter().collect()
    }
}

impl Path {
    fn evaluate(&self, doc: &Document) -> Vec<NodeId> {
        if self.steps.is_empty() {
            return Vec::new();
        }
        let mut context = vec![doc.root()];
        for step in &self.steps {
            context = step.evaluate(doc, &context);
            if context.is_empty() {
                break;
            }
        }
        context.retain(|id| doc.is_element(*id));
        context
    }
}

impl Step {
    fn evaluate(&self, doc: &Document, context: &[NodeId]) -> Vec<NodeId> {
        let context: Vec<NodeId> = if self.descend {
            let mut widened = BTreeSet::new();
            for node in context {
                widened.insert(*node);
                widened.extend(doc.descendants(*node));
            }
            widened.into_iter().collect()
        } else {
            context.to_vec()
        };

        let mut out = BTreeSet::new();
        for node in context {
            let candidates: Vec<NodeId> = match &self.kind {
                StepKind::Child(test) => doc
                    .element_children(node)
                    .filter(|child| match test {
                        Some(tag) => doc.tag(*child) == Some(tag.as_str()),
                        None => true,
                    })
                    .collect(),
                StepKind::Parent => doc.parent_element(node).into_iter().collect(),
                StepKind::Current => vec![node],
            };
            out.extend(self.filter(doc, candidates));
        }
        out.into_iter().collect()
    }

    fn filter(&self, doc: &Document, mut nodes: Vec<NodeId>) -> Vec<NodeId> {
        for predicate in &self.predicates {
            let size = nodes.len();
            nodes = nodes
                .into_iter()
                .enumerate()
                .filter(|(index, node)| {
                    let ctx = Context {
                        doc,
                        node: *node,
                        position: index + 1,
                        size,
                    };
                    match predicate.evaluate(&ctx) {
                        Value::Num(n) => n == (index + 1) as f64,
                        other => other.to_bool(),
                    }
                })
                .map(|(_, node)| node)
                .collect();
        }
        nodes
    }
}

struct Context<'a> {
    doc: &'a Document,
    node: NodeId,
    position: usize,
    size: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    /// String values of a node-set.
    Nodes(Vec<String>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(text) => !text.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn to_text(&self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().cloned().unwrap_or_default(),
            Value::Str(text) => text.clone(),
            Value::Num(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
            other => parse_number(&other.to_text()),
        }
    }
}

fn parse_number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

fn compare(left: &Value, right: &Value, negate: bool) -> bool {
    let strings = |a: &str, b: &str| (a == b) != negate;
    let numbers = |a: f64, b: f64| (a == b) != negate;
    match (left, right) {
        (Value::Nodes(xs), Value::Nodes(ys)) => {
            xs.iter().any(|x| ys.iter().any(|y| strings(x, y)))
        }
        (Value::Nodes(xs), other) | (other, Value::Nodes(xs)) => match other {
            Value::Num(n) => xs.iter().any(|x| numbers(parse_number(x), *n)),
            Value::Bool(b) => (!xs.is_empty() == *b) != negate,
            _ => {
                let text = other.to_text();
                xs.iter().any(|x| strings(x, &text))
            }
        },
        (Value::Bool(_), _) | (_, Value::Bool(_)) => (left.to_bool() == right.to_bool()) != negate,
        (Value::Num(_), _) | (_, Value::Num(_)) => numbers(left.to_number(), right.to_number()),
        _ => strings(&left.to_text(), &right.to_text()),
    }
}

impl Expr {
    fn evaluate(&self, ctx: &Context<'_>) -> Value {
        let doc = ctx.doc;
        match self {
            Expr::Literal(text) => Value::Str(text.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Attr(name) => Value::Nodes(
                doc.attr(ctx.node, name)
                    .map(|value| vec![value.to_string()])
                    .unwrap_or_default(),
            ),
            Expr::Text => Value::Nodes(doc.text_children(ctx.node).map(str::to_string).collect()),
            Expr::Context => Value::Nodes(vec![doc.text_content(ctx.node)]),
            Expr::Or(left, right) => {
                Value::Bool(left.evaluate(ctx).to_bool() || right.evaluate(ctx).to_bool())
            }
            Expr::And(left, right) => {
                Value::Bool(left.evaluate(ctx).to_bool() && right.evaluate(ctx).to_bool())
            }
            Expr::Compare {
                left,
                right,
                negate,
            } => Value::Bool(compare(&left.evaluate(ctx), &right.evaluate(ctx), *negate)),
            Expr::NormalizeSpace(arg) => {
                let text = match arg {
                    Some(arg) => arg.evaluate(ctx).to_text(),
                    None => doc.text_content(ctx.node),
                };
                Value::Str(normalize_whitespace(&text))
            }
            Expr::Contains(haystack, needle) => Value::Bool(
                haystack
                    .evaluate(ctx)
                    .to_text()
                    .contains(&needle.evaluate(ctx).to_text()),
            ),
            Expr::StartsWith(haystack, prefix) => Value::Bool(
                haystack
                    .evaluate(ctx)
                    .to_text()
                    .starts_with(&prefix.evaluate(ctx).to_text()),
            ),
            Expr::Concat(parts) => Value::Str(
                parts
                    .iter()
                    .map(|part| part.evaluate(ctx).to_text())
                    .collect(),
            ),
            Expr::Not(inner) => Value::Bool(!inner.evaluate(ctx).to_bool()),
            Expr::Last => Value::Num(ctx.size as f64),
            Expr::Position => Value::Num(ctx.position as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Dot,
    DotDot,
    Star,
    Eq,
    NotEq,
    Name(String),
    Literal(String),
    Number(f64),
}

fn lex(expr: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '|' | '[' | ']' | '(' | ')' | '@' | ',' | '*' | '=' => {
                tokens.push(match ch {
                    '|' => Token::Pipe,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '@' => Token::At,
                    ',' => Token::Comma,
                    '*' => Token::Star,
                    _ => Token::Eq,
                });
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|c| *c == ch)
                    .ok_or_else(|| QueryError::xpath(expr, "unterminated string literal"))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::xpath(expr, format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(QueryError::xpath(expr, format!("unexpected '{other}'")));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> QueryError {
        QueryError::xpath(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}"))),
        }
    }

    fn parse_union(mut self) -> Result<XPath, QueryError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let mut paths = vec![self.parse_path()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            paths.push(self.parse_path()?);
        }
        if let Some(token) = self.peek() {
            return Err(self.error(format!("unexpected {token:?}")));
        }
        Ok(XPath { paths })
    }

    fn parse_path(&mut self) -> Result<Path, QueryError> {
        let mut descend = false;
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if matches!(self.peek(), None | Some(Token::Pipe)) {
                    return Ok(Path { steps: Vec::new() });
                }
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                descend = true;
            }
            _ => {}
        }
        let mut steps = Vec::new();
        loop {
            steps.push(self.parse_step(descend)?);
            match self.peek() {
                Some(Token::Slash) => descend = false,
                Some(Token::DoubleSlash) => descend = true,
                _ => break,
            }
            self.pos += 1;
        }
        Ok(Path { steps })
    }

    fn parse_step(&mut self, descend: bool) -> Result<Step, QueryError> {
        let kind = match self.next() {
            Some(Token::Dot) => StepKind::Current,
            Some(Token::DotDot) => StepKind::Parent,
            Some(Token::Star) => StepKind::Child(None),
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(self.error(format!("node test '{name}()' is not supported")));
                }
                StepKind::Child(Some(name.to_ascii_lowercase()))
            }
            Some(Token::At) => return Err(self.error("attribute selection is not supported")),
            Some(token) => return Err(self.error(format!("unexpected {token:?}"))),
            None => return Err(self.error("expected a location step")),
        };
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(Step {
            descend,
            kind,
            predicates,
        })
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(name)) if name == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_and()?;
        while self.is_keyword("or") {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.parse_and()?));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_compare()?;
        while self.is_keyword("and") {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.parse_compare()?));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, QueryError> {
        let left = self.parse_primary()?;
        let negate = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::NotEq) => true,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_primary()?;
        Ok(Expr::Compare {
            left: Box::new(left),
            right: Box::new(right),
            negate,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        match self.next() {
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Dot) => Ok(Expr::Context),
            Some(Token::At) => match self.next() {
                Some(Token::Name(name)) => Ok(Expr::Attr(name.to_ascii_lowercase())),
                _ => Err(self.error("expected attribute name after '@'")),
            },
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let args = self.parse_args()?;
                self.function(&name, args)
            }
            Some(Token::Name(name)) => Err(self.error(format!(
                "relative path '{name}' inside a predicate is not supported"
            ))),
            Some(token) => Err(self.error(format!("unexpected {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, QueryError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn function(&self, name: &str, mut args: Vec<Expr>) -> Result<Expr, QueryError> {
        let count = args.len();
        let arity = move |expected: usize| -> Result<(), QueryError> {
            if count == expected {
                Ok(())
            } else {
                Err(self.error(format!("{name}() takes {expected} argument(s)")))
            }
        };
        match name {
            "text" => arity(0).map(|_| Expr::Text),
            "last" => arity(0).map(|_| Expr::Last),
            "position" => arity(0).map(|_| Expr::Position),
            "not" => {
                arity(1)?;
                Ok(Expr::Not(Box::new(args.remove(0))))
            }
            "normalize-space" => match args.len() {
                0 => Ok(Expr::NormalizeSpace(None)),
                1 => Ok(Expr::NormalizeSpace(Some(Box::new(args.remove(0))))),
                _ => Err(self.error("normalize-space() takes at most 1 argument")),
            },
            "contains" | "starts-with" => {
                arity(2)?;
                let needle = Box::new(args.remove(1));
                let haystack = Box::new(args.remove(0));
                Ok(if name == "contains" {
                    Expr::Contains(haystack, needle)
                } else {
                    Expr::StartsWith(haystack, needle)
                })
            }
            "concat" if args.len() >= 2 => Ok(Expr::Concat(args)),
            "concat" => Err(self.error("concat() takes at least 2 arguments")),
            other => Err(self.error(format!("unsupported function '{other}()'"))),
        }
    }
}

/// Quote `value` as an XPath string literal, using `concat()` when it holds
/// both quote characters.
pub fn literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
