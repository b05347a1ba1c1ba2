//! Lenient HTML tree builder.
//!
//! Handles the markup found in saved page sources: unclosed tags, stray end
//! tags, void elements, comments and raw-text elements. It is not a
//! full HTML5 tokenizer.

use tracing::trace;

use crate::document::{Document, NodeId};
use crate::style::geometry_from_style;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Content skipped entirely.
const SKIPPED_CONTENT_TAGS: &[&str] = &["script", "style"];

/// Content kept verbatim as a single text node.
const RAW_TEXT_TAGS: &[&str] = &["textarea", "title"];

pub fn parse(source: &str) -> Document {
    let mut builder = TreeBuilder::new(source);
    builder.run();
    builder.doc
}

struct TreeBuilder<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    doc: Document,
    stack: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    fn new(src: &'a str) -> Self {
        let doc = Document::new();
        let root = doc.root();
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            doc,
            stack: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.root())
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            if self.starts_with("<!--") {
                self.pos = find_from(self.bytes, self.pos + 4, b"-->")
                    .map(|end| end + 3)
                    .unwrap_or(self.bytes.len());
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.skip_past(b'>');
            } else if self.starts_with("</") {
                self.end_tag();
            } else if self.bytes[self.pos] == b'<'
                && self
                    .bytes
                    .get(self.pos + 1)
                    .map_or(false, |b| b.is_ascii_alphabetic())
            {
                self.start_tag();
            } else {
                self.text();
            }
        }
    }

    fn starts_with(&self, needle: &str) -> bool {
        self.bytes[self.pos..].starts_with(needle.as_bytes())
    }

    fn skip_past(&mut self, byte: u8) {
        self.pos = self.bytes[self.pos..]
            .iter()
            .position(|b| *b == byte)
            .map(|offset| self.pos + offset + 1)
            .unwrap_or(self.bytes.len());
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn text(&mut self) {
        let start = self.pos;
        // a lone '<' that does not open a tag is literal text
        let mut end = start + 1;
        while end < self.bytes.len() && self.bytes[end] != b'<' {
            end += 1;
        }
        self.pos = end;
        let raw = &self.src[start..end];
        let parent = self.current();
        if parent == self.doc.root() && raw.trim().is_empty() {
            return;
        }
        self.doc.append_text(parent, decode_entities(raw));
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'=' {
                break;
            }
            self.pos += 1;
        }
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn end_tag(&mut self) {
        self.pos += 2;
        let name = self.read_name();
        self.skip_past(b'>');
        if let Some(index) = self
            .stack
            .iter()
            .rposition(|node| self.doc.tag(*node) == Some(name.as_str()))
        {
            self.stack.truncate(index);
        } else {
            trace!(target: "dom_snapshot", tag = %name, "ignoring stray end tag");
        }
    }

    fn start_tag(&mut self) {
        self.pos += 1;
        let name = self.read_name();
        let (attributes, self_closing) = self.attributes();
        self.close_implied(&name);

        let geometry = attributes
            .iter()
            .find(|(key, _)| key == "style")
            .and_then(|(_, style)| geometry_from_style(style));
        let parent = self.current();
        let node = self.doc.append_element(parent, name.clone(), attributes);
        if let Some(rect) = geometry {
            self.doc.set_geometry(node, rect);
        }

        let tag = name.as_str();
        if SKIPPED_CONTENT_TAGS.contains(&tag) {
            self.skip_raw_content(tag);
        } else if RAW_TEXT_TAGS.contains(&tag) {
            let content = self.skip_raw_content(tag);
            if !content.is_empty() {
                self.doc.append_text(node, decode_entities(&content));
            }
        } else if !self_closing && !VOID_TAGS.contains(&tag) {
            self.stack.push(node);
        }
    }

    /// Consume everything up to the matching end tag and return it.
    fn skip_raw_content(&mut self, tag: &str) -> String {
        let closing = format!("</{tag}");
        let start = self.pos;
        match find_ci(self.bytes, self.pos, closing.as_bytes()) {
            Some(end) => {
                self.pos = end;
                self.skip_past(b'>');
                self.src[start..end].to_string()
            }
            None => {
                self.pos = self.bytes.len();
                self.src[start..].to_string()
            }
        }
    }

    fn attributes(&mut self) -> (Vec<(String, String)>, bool) {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                return (attributes, false);
            }
            match self.bytes[self.pos] {
                b'>' => {
                    self.pos += 1;
                    return (attributes, false);
                }
                b'/' => {
                    self.pos += 1;
                    if self.bytes.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        return (attributes, true);
                    }
                }
                _ => {
                    let name = self.read_name();
                    if name.is_empty() {
                        // unexpected '=' or similar, skip one byte
                        self.pos += 1;
                        continue;
                    }
                    self.skip_whitespace();
                    let value = if self.bytes.get(self.pos) == Some(&b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.attribute_value()
                    } else {
                        String::new()
                    };
                    attributes.push((name, value));
                }
            }
        }
    }

    fn attribute_value(&mut self) -> String {
        let Some(&first) = self.bytes.get(self.pos) else {
            return String::new();
        };
        if first == b'"' || first == b'\'' {
            let start = self.pos + 1;
            let end = self.bytes[start..]
                .iter()
                .position(|b| *b == first)
                .map(|offset| start + offset)
                .unwrap_or(self.bytes.len());
            self.pos = (end + 1).min(self.bytes.len());
            decode_entities(&self.src[start..end])
        } else {
            let start = self.pos;
            while self.pos < self.bytes.len()
                && !self.bytes[self.pos].is_ascii_whitespace()
                && self.bytes[self.pos] != b'>'
            {
                self.pos += 1;
            }
            decode_entities(&self.src[start..self.pos])
        }
    }

    /// Auto-close elements whose end tag is optional.
    fn close_implied(&mut self, opening: &str) {
        let closes: &[&str] = match opening {
            "li" => &["li"],
            "option" => &["option"],
            "p" => &["p"],
            "dt" | "dd" => &["dt", "dd"],
            "td" | "th" => &["td", "th"],
            "tr" => &["tr", "td", "th"],
            _ => return,
        };
        while let Some(top) = self.stack.last().copied() {
            match self.doc.tag(top) {
                Some(tag) if closes.contains(&tag) => {
                    self.stack.pop();
                }
                _ => break,
            }
        }
    }
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_ci(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|offset| from + offset)
}

/// Decode the handful of entities that matter for locator text.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric
                .strip_prefix('x')
                .or_else(|| numeric.strip_prefix('X'))
            {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
