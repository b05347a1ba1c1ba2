//! DOM snapshots captured from a live page.
//!
//! Unlike page source, a snapshot carries layout boxes, which the similarity
//! scorer uses for its location and area metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{Document, NodeId, Rect};
use crate::html::decode_entities;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(default, alias = "nodeName", alias = "tagName")]
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
    #[serde(default)]
    pub bounds: Option<Rect>,
}

impl SnapshotNode {
    fn is_text(&self) -> bool {
        self.tag.is_empty() || self.tag == "#text"
    }
}

pub(crate) fn build(node: &SnapshotNode) -> Document {
    let mut doc = Document::new();
    let root = doc.root();
    if node.tag == "#document" {
        for child in &node.children {
            append(&mut doc, root, child);
        }
    } else {
        append(&mut doc, root, node);
    }
    doc
}

fn append(doc: &mut Document, parent: NodeId, node: &SnapshotNode) {
    if node.is_text() {
        if let Some(text) = node.text.as_deref() {
            doc.append_text(parent, decode_entities(text));
        }
        return;
    }
    let attributes = node
        .attributes
        .iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
        .collect();
    let element = doc.append_element(parent, node.tag.as_str(), attributes);
    if let Some(rect) = node.bounds {
        doc.set_geometry(element, rect);
    }
    if let Some(text) = node.text.as_deref() {
        if !text.is_empty() {
            doc.append_text(element, text);
        }
    }
    for child in &node.children {
        append(doc, element, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_document_with_geometry() {
        let doc = Document::from_snapshot_json(
            r##"{
                "tag": "body",
                "children": [
                    {"tag": "BUTTON", "attributes": {"ID": "go"}, "text": "Go",
                     "bounds": {"x": 5, "y": 6, "width": 70, "height": 20}},
                    {"tag": "#text", "text": " tail"}
                ]
            }"##,
        )
        .unwrap();
        let elements: Vec<_> = doc.elements().collect();
        assert_eq!(elements.len(), 2);
        let button = elements[1];
        assert_eq!(doc.tag(button), Some("button"));
        assert_eq!(doc.attr(button, "id"), Some("go"));
        assert_eq!(doc.geometry(button).unwrap().width, 70.0);
        assert_eq!(doc.normalized_text(elements[0]), "Go tail");
    }

    #[test]
    fn document_wrapper_is_transparent() {
        let doc = Document::from_snapshot_json(
            r##"{"tag":"#document","children":[{"tag":"html","children":[{"tagName":"body"}]}]}"##,
        )
        .unwrap();
        let tags: Vec<_> = doc.elements().filter_map(|id| doc.tag(id)).collect();
        assert_eq!(tags, vec!["html", "body"]);
    }

    #[test]
    fn rejects_malformed_snapshot() {
        assert!(Document::from_snapshot_json(r#"{"tag": 5}"#).is_err());
    }
}
