//! Locator wire grammar.
//!
//! A locator travels as `"<prefix>=<value>"`. The live session and the code
//! updater both consume this exact text, so formatting must round-trip
//! byte-for-byte.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Locator strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Id,
    Name,
    Css,
    #[serde(rename = "xpath")]
    XPath,
    LinkText,
    PartialLinkText,
    TagName,
    ClassName,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 8] = [
        StrategyKind::Id,
        StrategyKind::Name,
        StrategyKind::Css,
        StrategyKind::XPath,
        StrategyKind::LinkText,
        StrategyKind::PartialLinkText,
        StrategyKind::TagName,
        StrategyKind::ClassName,
    ];

    /// Wire prefix used in `"<prefix>=<value>"`.
    pub fn prefix(&self) -> &'static str {
        match self {
            StrategyKind::Id => "id",
            StrategyKind::Name => "name",
            StrategyKind::Css => "css",
            StrategyKind::XPath => "xpath",
            StrategyKind::LinkText => "link_text",
            StrategyKind::PartialLinkText => "partial_link_text",
            StrategyKind::TagName => "tag_name",
            StrategyKind::ClassName => "class_name",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    /// Fixed bonus applied when choosing between validated alternatives.
    pub fn strategy_bonus(&self) -> f64 {
        match self {
            StrategyKind::Id => 1.0,
            StrategyKind::Name => 0.8,
            StrategyKind::Css => 0.6,
            StrategyKind::XPath => 0.4,
            StrategyKind::LinkText => 0.5,
            StrategyKind::PartialLinkText => 0.3,
            StrategyKind::TagName => 0.2,
            StrategyKind::ClassName => 0.4,
        }
    }

    /// Stability assumed for a locator of this kind when a producer does not
    /// report one.
    pub fn default_stability(&self) -> f64 {
        match self {
            StrategyKind::Id => 0.9,
            StrategyKind::Name => 0.8,
            StrategyKind::Css => 0.7,
            StrategyKind::XPath => 0.5,
            StrategyKind::LinkText => 0.6,
            StrategyKind::PartialLinkText => 0.4,
            StrategyKind::TagName => 0.2,
            StrategyKind::ClassName => 0.5,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Parsed locator.
///
/// Text without a recognised prefix is kept verbatim as [`Locator::PlainText`]
/// and resolved by literal text search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Locator {
    Typed { strategy: StrategyKind, value: String },
    PlainText(String),
}

impl Locator {
    pub fn new(strategy: StrategyKind, value: impl Into<String>) -> Self {
        Locator::Typed {
            strategy,
            value: value.into(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        if let Some((prefix, value)) = raw.split_once('=') {
            if let Some(strategy) = StrategyKind::from_prefix(prefix) {
                return Locator::Typed {
                    strategy,
                    value: value.to_string(),
                };
            }
        }
        Locator::PlainText(raw.to_string())
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            Locator::Typed { strategy, .. } => Some(*strategy),
            Locator::PlainText(_) => None,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Typed { value, .. } => value,
            Locator::PlainText(text) => text,
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, Locator::Typed { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Typed { strategy, value } => write!(f, "{}={}", strategy.prefix(), value),
            Locator::PlainText(text) => f.write_str(text),
        }
    }
}

impl FromStr for Locator {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Locator::parse(s))
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Locator::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.to_string()
    }
}
