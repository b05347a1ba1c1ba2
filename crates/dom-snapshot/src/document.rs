//! Arena-backed document tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::DomError;
use crate::snapshot::SnapshotNode;

/// Index of a node inside its [`Document`].
///
/// Nodes are allocated in pre-order, so comparing ids compares document
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        geometry: Option<Rect>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<Node>,
}

/// Tags whose content never renders as visible text.
const HIDDEN_TEXT_TAGS: &[&str] = &["script", "style", "template", "noscript", "head"];

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
        }
    }

    /// Parse page source. Never fails; malformed markup is repaired.
    pub fn parse_html(source: &str) -> Self {
        crate::html::parse(source)
    }

    pub fn from_snapshot_json(raw: &str) -> Result<Self, DomError> {
        let node: SnapshotNode = serde_json::from_str(raw)
            .map_err(|err| DomError::InvalidSnapshot(err.to_string()))?;
        Ok(Self::from_snapshot(&node))
    }

    pub fn from_snapshot(node: &SnapshotNode) -> Self {
        crate::snapshot::build(node)
    }

    /// Load either a JSON DOM snapshot or HTML source.
    pub fn load(raw: &str) -> Result<Self, DomError> {
        if raw.trim_start().starts_with('{') {
            Self::from_snapshot_json(raw)
        } else {
            Ok(Self::parse_html(raw))
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: impl Into<String>,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let mut unique: Vec<(String, String)> = Vec::with_capacity(attributes.len());
        for (key, value) in attributes {
            if !unique.iter().any(|(existing, _)| existing == &key) {
                unique.push((key, value));
            }
        }
        self.push(
            parent,
            NodeKind::Element {
                tag: tag.into().to_ascii_lowercase(),
                attributes: unique,
                geometry: None,
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.push(parent, NodeKind::Text(text.into()))
    }

    pub fn set_geometry(&mut self, id: NodeId, rect: Rect) {
        if let NodeKind::Element { geometry, .. } = &mut self.nodes[id.0].kind {
            *geometry = Some(rect);
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn geometry(&self, id: NodeId) -> Option<Rect> {
        match &self.node(id).kind {
            NodeKind::Element { geometry, .. } => *geometry,
            _ => None,
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|value| value.split_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.is_element(*child))
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(move |id| self.is_element(*id))
    }

    /// Element descendants of `id` (excluding `id`) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if self.is_element(next) {
                out.push(next);
            }
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent_element(id), move |current| {
            self.parent_element(*current)
        })
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|candidate| candidate == ancestor)
    }

    /// Direct text children, raw.
    pub fn text_children(&self, id: NodeId) -> impl Iterator<Item = &str> + '_ {
        self.children(id)
            .iter()
            .filter_map(move |child| match &self.node(*child).kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
    }

    /// Concatenated descendant text, skipping non-rendered subtrees.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { tag, .. } if HIDDEN_TEXT_TAGS.contains(&tag.as_str()) => {}
            _ => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    pub fn normalized_text(&self, id: NodeId) -> String {
        normalize_whitespace(&self.text_content(id))
    }

    /// 1-based position among element siblings with the same tag, plus the
    /// number of such siblings.
    fn same_tag_position(&self, id: NodeId) -> (usize, usize) {
        let tag = self.tag(id).unwrap_or_default();
        let Some(parent) = self.parent(id) else {
            return (1, 1);
        };
        let mut position = 1;
        let mut total = 0;
        for sibling in self.element_children(parent) {
            if self.tag(sibling) == Some(tag) {
                total += 1;
                if sibling < id {
                    position += 1;
                }
            }
        }
        (position, total.max(1))
    }

    fn xpath_step(&self, id: NodeId) -> String {
        format_step(self.tag(id), self.same_tag_position(id))
    }

    /// Root-anchored path such as `/html/body/div[2]/button`.
    ///
    /// Scans siblings at every step; use [`XPathIndex`] when generating paths
    /// for many nodes of the same document.
    pub fn absolute_xpath(&self, id: NodeId) -> String {
        self.absolute_path(id, &|node| self.xpath_step(node))
    }

    /// Path anchored at the nearest ancestor carrying an `id`, falling back to
    /// `//body` and finally to the absolute path.
    pub fn relative_xpath(&self, id: NodeId) -> String {
        self.relative_path(id, &|node| self.xpath_step(node))
    }

    fn absolute_path(&self, id: NodeId, step: &dyn Fn(NodeId) -> String) -> String {
        if !self.is_element(id) {
            return String::new();
        }
        let mut steps = vec![step(id)];
        steps.extend(self.ancestors(id).map(step));
        steps.reverse();
        format!("/{}", steps.join("/"))
    }

    fn relative_path(&self, id: NodeId, step: &dyn Fn(NodeId) -> String) -> String {
        if !self.is_element(id) {
            return String::new();
        }
        let mut steps = vec![step(id)];
        for ancestor in self.ancestors(id) {
            if let Some(anchor_id) = self.attr(ancestor, "id") {
                if !anchor_id.is_empty() && !anchor_id.contains('\'') {
                    steps.reverse();
                    return format!("//*[@id='{}']/{}", anchor_id, steps.join("/"));
                }
            }
            if self.tag(ancestor) == Some("body") {
                steps.reverse();
                return format!("//body/{}", steps.join("/"));
            }
            steps.push(step(ancestor));
        }
        self.absolute_path(id, step)
    }
}

fn format_step(tag: Option<&str>, (position, total): (usize, usize)) -> String {
    let tag = tag.unwrap_or("*");
    if total > 1 {
        format!("{tag}[{position}]")
    } else {
        tag.to_string()
    }
}

/// Same-tag sibling positions for every node of a document, computed in one
/// pass so path generation stays linear in the depth of each node.
pub struct XPathIndex<'d> {
    doc: &'d Document,
    positions: Vec<(usize, usize)>,
}

impl<'d> XPathIndex<'d> {
    pub fn new(doc: &'d Document) -> Self {
        let mut positions = vec![(1, 1); doc.len()];
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for parent in 0..doc.len() {
            let parent = NodeId(parent);
            if doc.node(parent).children.is_empty() {
                continue;
            }
            counts.clear();
            for child in doc.element_children(parent) {
                let seen = counts.entry(doc.tag(child).unwrap_or_default()).or_insert(0);
                *seen += 1;
                positions[child.0].0 = *seen;
            }
            for child in doc.element_children(parent) {
                let tag = doc.tag(child).unwrap_or_default();
                positions[child.0].1 = counts.get(tag).copied().unwrap_or(1);
            }
        }
        Self { doc, positions }
    }

    fn step(&self, id: NodeId) -> String {
        let position = self.positions.get(id.0).copied().unwrap_or((1, 1));
        format_step(self.doc.tag(id), position)
    }

    /// Same result as [`Document::absolute_xpath`].
    pub fn absolute(&self, id: NodeId) -> String {
        self.doc.absolute_path(id, &|node| self.step(node))
    }

    /// Same result as [`Document::relative_xpath`].
    pub fn relative(&self, id: NodeId) -> String {
        self.doc.relative_path(id, &|node| self.step(node))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let html = doc.append_element(doc.root(), "HTML", vec![]);
        let body = doc.append_element(html, "body", vec![]);
        let form = doc.append_element(body, "form", vec![("id".into(), "login".into())]);
        let first = doc.append_element(form, "button", vec![]);
        doc.append_text(first, "  Cancel ");
        let second = doc.append_element(
            form,
            "button",
            vec![("class".into(), "btn primary".into())],
        );
        doc.append_text(second, "Log\n In");
        (doc, first, second)
    }

    #[test]
    fn tags_are_lowercased_and_order_is_preorder() {
        let (doc, first, second) = sample();
        let tags: Vec<_> = doc.elements().filter_map(|id| doc.tag(id)).collect();
        assert_eq!(tags, vec!["html", "body", "form", "button", "button"]);
        assert!(first < second);
    }

    #[test]
    fn duplicate_attributes_keep_first() {
        let mut doc = Document::new();
        let node = doc.append_element(
            doc.root(),
            "div",
            vec![("id".into(), "a".into()), ("id".into(), "b".into())],
        );
        assert_eq!(doc.attr(node, "id"), Some("a"));
        assert_eq!(doc.attributes(node).len(), 1);
    }

    #[test]
    fn text_is_normalized() {
        let (doc, first, second) = sample();
        assert_eq!(doc.normalized_text(first), "Cancel");
        assert_eq!(doc.normalized_text(second), "Log In");
        assert!(doc.has_class(second, "primary"));
        assert!(!doc.has_class(second, "prim"));
    }

    #[test]
    fn xpath_generation() {
        let (doc, first, second) = sample();
        assert_eq!(doc.absolute_xpath(first), "/html/body/form/button[1]");
        assert_eq!(doc.absolute_xpath(second), "/html/body/form/button[2]");
        assert_eq!(doc.relative_xpath(second), "//*[@id='login']/button[2]");
    }

    #[test]
    fn indexed_paths_match_direct_paths() {
        let (doc, first, second) = sample();
        let index = XPathIndex::new(&doc);
        for node in doc.elements() {
            assert_eq!(index.absolute(node), doc.absolute_xpath(node));
            assert_eq!(index.relative(node), doc.relative_xpath(node));
        }
        assert_eq!(index.absolute(second), "/html/body/form/button[2]");
        assert_eq!(index.relative(first), "//*[@id='login']/button[1]");
    }

    #[test]
    fn indexed_paths_scale_to_wide_parents() {
        let mut doc = Document::new();
        let html = doc.append_element(doc.root(), "html", vec![]);
        let body = doc.append_element(html, "body", vec![]);
        let rows: Vec<NodeId> = (0..5_000)
            .map(|_| doc.append_element(body, "div", vec![]))
            .collect();
        let index = XPathIndex::new(&doc);
        assert_eq!(index.absolute(rows[4_999]), "/html/body/div[5000]");
        assert_eq!(index.relative(rows[0]), "//body/div[1]");
    }

    #[test]
    fn relative_xpath_falls_back_to_body() {
        let mut doc = Document::new();
        let html = doc.append_element(doc.root(), "html", vec![]);
        let body = doc.append_element(html, "body", vec![]);
        let div = doc.append_element(body, "div", vec![]);
        let link = doc.append_element(div, "a", vec![]);
        assert_eq!(doc.relative_xpath(link), "//body/div/a");

        let mut bare = Document::new();
        let span = bare.append_element(bare.root(), "span", vec![]);
        assert_eq!(bare.relative_xpath(span), "/span");
    }

    #[test]
    fn load_detects_format() {
        let html = Document::load("<p>hi</p>").unwrap();
        assert_eq!(html.elements().count(), 1);
        let json = Document::load(r#"{"tag":"div","children":[{"tag":"span"}]}"#).unwrap();
        assert_eq!(json.elements().count(), 2);
        assert!(Document::load("{ not json").is_err());
    }
}
