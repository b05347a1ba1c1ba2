//! Property, metric and weight table.

use std::collections::BTreeMap;
use std::fmt;

use heal_core_types::ElementProperties;
use serde::{Deserialize, Serialize};

use crate::errors::ScorerError;

/// A comparable facet of [`ElementProperties`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Tag,
    Id,
    Name,
    #[serde(rename = "type")]
    Type,
    AriaLabel,
    ClassName,
    Href,
    Alt,
    Src,
    Role,
    #[serde(rename = "absolute_xpath")]
    AbsoluteXPath,
    #[serde(rename = "relative_xpath")]
    RelativeXPath,
    LocationX,
    LocationY,
    Area,
    VisibleText,
    Placeholder,
    Value,
    NeighborTexts,
    ParentTag,
    SiblingTags,
    IsButton,
    IsClickable,
    IsInput,
    Attributes,
}

/// Shape of a property's value; decides which metrics apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    List,
    Flag,
    Coordinate,
    Area,
    Map,
}

pub(crate) enum PropertyValue<'a> {
    Text(&'a str),
    List(&'a [String]),
    Flag(bool),
    /// Coordinate on one axis, plus whether the element carries geometry.
    Coordinate(f64, bool),
    Area(f64),
    Map(&'a BTreeMap<String, String>),
}

impl Property {
    pub const ALL: [Property; 25] = [
        Property::Tag,
        Property::Id,
        Property::Name,
        Property::Type,
        Property::AriaLabel,
        Property::ClassName,
        Property::Href,
        Property::Alt,
        Property::Src,
        Property::Role,
        Property::AbsoluteXPath,
        Property::RelativeXPath,
        Property::LocationX,
        Property::LocationY,
        Property::Area,
        Property::VisibleText,
        Property::Placeholder,
        Property::Value,
        Property::NeighborTexts,
        Property::ParentTag,
        Property::SiblingTags,
        Property::IsButton,
        Property::IsClickable,
        Property::IsInput,
        Property::Attributes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Tag => "tag",
            Property::Id => "id",
            Property::Name => "name",
            Property::Type => "type",
            Property::AriaLabel => "aria_label",
            Property::ClassName => "class_name",
            Property::Href => "href",
            Property::Alt => "alt",
            Property::Src => "src",
            Property::Role => "role",
            Property::AbsoluteXPath => "absolute_xpath",
            Property::RelativeXPath => "relative_xpath",
            Property::LocationX => "location_x",
            Property::LocationY => "location_y",
            Property::Area => "area",
            Property::VisibleText => "visible_text",
            Property::Placeholder => "placeholder",
            Property::Value => "value",
            Property::NeighborTexts => "neighbor_texts",
            Property::ParentTag => "parent_tag",
            Property::SiblingTags => "sibling_tags",
            Property::IsButton => "is_button",
            Property::IsClickable => "is_clickable",
            Property::IsInput => "is_input",
            Property::Attributes => "attributes",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Property::NeighborTexts | Property::SiblingTags => ValueKind::List,
            Property::IsButton | Property::IsClickable | Property::IsInput => ValueKind::Flag,
            Property::LocationX | Property::LocationY => ValueKind::Coordinate,
            Property::Area => ValueKind::Area,
            Property::Attributes => ValueKind::Map,
            _ => ValueKind::Text,
        }
    }

    pub(crate) fn value<'a>(&self, element: &'a ElementProperties) -> PropertyValue<'a> {
        let has_geometry = element.has_geometry();
        match self {
            Property::Tag => PropertyValue::Text(&element.tag),
            Property::Id => PropertyValue::Text(&element.id),
            Property::Name => PropertyValue::Text(&element.name),
            Property::Type => PropertyValue::Text(&element.type_),
            Property::AriaLabel => PropertyValue::Text(&element.aria_label),
            Property::ClassName => PropertyValue::Text(&element.class_name),
            Property::Href => PropertyValue::Text(&element.href),
            Property::Alt => PropertyValue::Text(&element.alt),
            Property::Src => PropertyValue::Text(&element.src),
            Property::Role => PropertyValue::Text(&element.role),
            Property::AbsoluteXPath => PropertyValue::Text(&element.absolute_xpath),
            Property::RelativeXPath => PropertyValue::Text(&element.relative_xpath),
            Property::LocationX => PropertyValue::Coordinate(element.x, has_geometry),
            Property::LocationY => PropertyValue::Coordinate(element.y, has_geometry),
            Property::Area => PropertyValue::Area(element.area()),
            Property::VisibleText => PropertyValue::Text(&element.visible_text),
            Property::Placeholder => PropertyValue::Text(&element.placeholder),
            Property::Value => PropertyValue::Text(&element.value),
            Property::NeighborTexts => PropertyValue::List(&element.neighbor_texts),
            Property::ParentTag => PropertyValue::Text(&element.parent_tag),
            Property::SiblingTags => PropertyValue::List(&element.sibling_tags),
            Property::IsButton => PropertyValue::Flag(element.is_button),
            Property::IsClickable => PropertyValue::Flag(element.is_clickable),
            Property::IsInput => PropertyValue::Flag(element.is_input),
            Property::Attributes => PropertyValue::Map(&element.attributes),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PropertyValue<'_> {
    /// Whether this side carries anything worth comparing.
    pub(crate) fn is_present(&self) -> bool {
        match self {
            PropertyValue::Text(text) => !text.is_empty(),
            PropertyValue::List(items) => items.iter().any(|item| !item.trim().is_empty()),
            PropertyValue::Flag(flag) => *flag,
            PropertyValue::Coordinate(_, has_geometry) => *has_geometry,
            PropertyValue::Area(area) => *area > 0.0,
            PropertyValue::Map(map) => !map.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Equality,
    Levenshtein,
    JaccardChars,
    JaroWinkler,
    TokenSet,
    ListSet,
    SpatialDecay,
    AreaRatio,
    Boolean,
    KeyValue,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Equality => "equality",
            Metric::Levenshtein => "levenshtein",
            Metric::JaccardChars => "jaccard_chars",
            Metric::JaroWinkler => "jaro_winkler",
            Metric::TokenSet => "token_set",
            Metric::ListSet => "list_set",
            Metric::SpatialDecay => "spatial_decay",
            Metric::AreaRatio => "area_ratio",
            Metric::Boolean => "boolean",
            Metric::KeyValue => "key_value",
        }
    }

    pub fn accepts(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Text => matches!(
                self,
                Metric::Equality
                    | Metric::Levenshtein
                    | Metric::JaccardChars
                    | Metric::JaroWinkler
                    | Metric::TokenSet
            ),
            ValueKind::List => *self == Metric::ListSet,
            ValueKind::Flag => *self == Metric::Boolean,
            ValueKind::Coordinate => *self == Metric::SpatialDecay,
            ValueKind::Area => *self == Metric::AreaRatio,
            ValueKind::Map => *self == Metric::KeyValue,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub property: Property,
    pub metric: Metric,
    pub weight: f64,
}

/// Change to one property's entry; unset fields keep the current value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightOverride {
    pub metric: Option<Metric>,
    pub weight: Option<f64>,
}

impl WeightOverride {
    pub fn weight(weight: f64) -> Self {
        Self {
            metric: None,
            weight: Some(weight),
        }
    }

    pub fn metric(metric: Metric) -> Self {
        Self {
            metric: Some(metric),
            weight: None,
        }
    }
}

/// One `(property, metric, weight)` triple per [`Property`], in
/// [`Property::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    entries: Vec<WeightEntry>,
}

impl WeightTable {
    fn default_entry(property: Property) -> WeightEntry {
        let (metric, weight) = match property {
            Property::Id => (Metric::Levenshtein, 2.70),
            Property::Name => (Metric::Levenshtein, 2.90),
            Property::AriaLabel => (Metric::Levenshtein, 2.95),
            Property::VisibleText => (Metric::Levenshtein, 2.95),
            Property::IsButton => (Metric::Boolean, 2.85),
            Property::Attributes => (Metric::KeyValue, 2.20),
            Property::Alt => (Metric::Levenshtein, 1.95),
            Property::LocationX => (Metric::SpatialDecay, 2.00),
            Property::LocationY => (Metric::SpatialDecay, 2.00),
            Property::Area => (Metric::AreaRatio, 1.30),
            Property::Type => (Metric::Equality, 1.10),
            Property::ClassName => (Metric::TokenSet, 1.00),
            Property::NeighborTexts => (Metric::ListSet, 1.00),
            Property::Tag => (Metric::JaccardChars, 0.80),
            Property::Href => (Metric::Levenshtein, 0.30),
            Property::AbsoluteXPath => (Metric::Levenshtein, 0.50),
            Property::RelativeXPath => (Metric::Levenshtein, 0.50),
            Property::Role | Property::Placeholder | Property::Value | Property::Src => {
                (Metric::Levenshtein, 0.0)
            }
            Property::ParentTag => (Metric::Equality, 0.0),
            Property::SiblingTags => (Metric::ListSet, 0.0),
            Property::IsClickable | Property::IsInput => (Metric::Boolean, 0.0),
        };
        WeightEntry {
            property,
            metric,
            weight,
        }
    }

    /// Merge `overrides` over the default table.
    pub fn with_overrides<I>(overrides: I) -> Result<Self, ScorerError>
    where
        I: IntoIterator<Item = (Property, WeightOverride)>,
    {
        let mut table = Self::default();
        for (property, change) in overrides {
            table.apply(property, change)?;
        }
        Ok(table)
    }

    pub fn set_weight(&mut self, property: Property, weight: f64) -> Result<(), ScorerError> {
        self.apply(property, WeightOverride::weight(weight))
    }

    pub fn set_metric(&mut self, property: Property, metric: Metric) -> Result<(), ScorerError> {
        self.apply(property, WeightOverride::metric(metric))
    }

    pub fn apply(&mut self, property: Property, change: WeightOverride) -> Result<(), ScorerError> {
        if let Some(weight) = change.weight {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ScorerError::InvalidWeight { property, weight });
            }
        }
        if let Some(metric) = change.metric {
            if !metric.accepts(property.kind()) {
                return Err(ScorerError::IncompatibleMetric { property, metric });
            }
        }
        let entry = self.entry_mut(property);
        if let Some(weight) = change.weight {
            entry.weight = weight;
        }
        if let Some(metric) = change.metric {
            entry.metric = metric;
        }
        Ok(())
    }

    fn entry_mut(&mut self, property: Property) -> &mut WeightEntry {
        let index = match self.entries.iter().position(|e| e.property == property) {
            Some(index) => index,
            None => {
                self.entries.push(Self::default_entry(property));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn get(&self, property: Property) -> WeightEntry {
        self.entries
            .iter()
            .copied()
            .find(|entry| entry.property == property)
            .unwrap_or_else(|| Self::default_entry(property))
    }

    pub fn weight(&self, property: Property) -> f64 {
        self.get(property).weight
    }

    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    /// Entries that can contribute to a score.
    pub fn active(&self) -> impl Iterator<Item = &WeightEntry> {
        self.entries.iter().filter(|entry| entry.weight > 0.0)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            entries: Property::ALL.iter().map(|p| Self::default_entry(*p)).collect(),
        }
    }
}
