//! Normalised element snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of the properties used to re-identify one element.
///
/// String fields default to empty rather than being optional, so comparison
/// code only ever needs an emptiness check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementProperties {
    pub tag: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub aria_label: String,
    /// Raw `class` attribute; token order is irrelevant for comparison.
    pub class_name: String,
    pub href: String,
    pub alt: String,
    pub src: String,
    pub role: String,
    pub absolute_xpath: String,
    pub relative_xpath: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible_text: String,
    pub placeholder: String,
    pub value: String,
    pub neighbor_texts: Vec<String>,
    pub parent_tag: String,
    pub sibling_tags: Vec<String>,
    pub is_button: bool,
    pub is_clickable: bool,
    pub is_input: bool,
    pub attributes: BTreeMap<String, String>,
}

impl ElementProperties {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Width over height; zero when the element has no height.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height > 0.0 {
            self.width.max(0.0) / self.height
        } else {
            0.0
        }
    }

    /// Whether any geometry was captured for the element.
    pub fn has_geometry(&self) -> bool {
        self.x != 0.0 || self.y != 0.0 || self.width > 0.0 || self.height > 0.0
    }

    pub fn class_tokens(&self) -> impl Iterator<Item = &str> {
        self.class_name.split_whitespace()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
