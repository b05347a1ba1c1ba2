//! Locator synthesis for a candidate element.
//!
//! Up to eight strategies, most stable first:
//! id, name, test-id attribute, aria-label CSS, class CSS, text XPath,
//! relative XPath, absolute XPath.

use dom_snapshot::css::is_plain_ident;
use dom_snapshot::xpath;
use heal_core_types::{CandidateSource, ElementProperties, LocatorCandidate, StrategyKind};

/// Test hook attributes, checked in order.
pub const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test", "data-qa", "data-cy"];

const MAX_CLASS_TOKENS: usize = 3;
/// Longer texts make brittle text predicates.
const MAX_TEXT_LOCATOR_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisKind {
    Id,
    Name,
    TestId,
    AriaLabel,
    ClassList,
    Text,
    RelativeXPath,
    AbsoluteXPath,
}

impl SynthesisKind {
    pub const ORDER: [SynthesisKind; 8] = [
        SynthesisKind::Id,
        SynthesisKind::Name,
        SynthesisKind::TestId,
        SynthesisKind::AriaLabel,
        SynthesisKind::ClassList,
        SynthesisKind::Text,
        SynthesisKind::RelativeXPath,
        SynthesisKind::AbsoluteXPath,
    ];

    pub fn stability(&self) -> f64 {
        match self {
            SynthesisKind::Id => 0.95,
            SynthesisKind::Name => 0.85,
            SynthesisKind::TestId => 0.90,
            SynthesisKind::AriaLabel => 0.80,
            SynthesisKind::ClassList => 0.60,
            SynthesisKind::Text => 0.55,
            SynthesisKind::RelativeXPath => 0.40,
            SynthesisKind::AbsoluteXPath => 0.20,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SynthesisKind::Id => "id attribute",
            SynthesisKind::Name => "name attribute",
            SynthesisKind::TestId => "test id attribute",
            SynthesisKind::AriaLabel => "aria-label",
            SynthesisKind::ClassList => "class list",
            SynthesisKind::Text => "visible text",
            SynthesisKind::RelativeXPath => "relative xpath",
            SynthesisKind::AbsoluteXPath => "absolute xpath",
        }
    }

    fn build(&self, element: &ElementProperties) -> Option<(StrategyKind, String)> {
        let tag = if element.tag.is_empty() {
            "*"
        } else {
            element.tag.as_str()
        };
        match self {
            SynthesisKind::Id => non_empty(&element.id).map(|id| (StrategyKind::Id, id)),
            SynthesisKind::Name => non_empty(&element.name).map(|name| (StrategyKind::Name, name)),
            SynthesisKind::TestId => TEST_ID_ATTRIBUTES.iter().find_map(|attr| {
                element
                    .attribute(attr)
                    .filter(|value| !value.is_empty())
                    .map(|value| (StrategyKind::Css, format!("[{attr}={}]", css_string(value))))
            }),
            SynthesisKind::AriaLabel => non_empty(&element.aria_label).map(|label| {
                (
                    StrategyKind::Css,
                    format!("{tag}[aria-label={}]", css_string(&label)),
                )
            }),
            SynthesisKind::ClassList => {
                let classes: Vec<&str> = element
                    .class_tokens()
                    .filter(|token| is_plain_ident(token))
                    .take(MAX_CLASS_TOKENS)
                    .collect();
                if classes.is_empty() {
                    None
                } else {
                    Some((StrategyKind::Css, format!("{tag}.{}", classes.join("."))))
                }
            }
            SynthesisKind::Text => {
                let text = element.visible_text.as_str();
                if text.is_empty() || text.chars().count() > MAX_TEXT_LOCATOR_LEN {
                    None
                } else {
                    Some((
                        StrategyKind::XPath,
                        format!("//{tag}[normalize-space()={}]", xpath::literal(text)),
                    ))
                }
            }
            SynthesisKind::RelativeXPath => {
                non_empty(&element.relative_xpath).map(|path| (StrategyKind::XPath, path))
            }
            SynthesisKind::AbsoluteXPath => {
                non_empty(&element.absolute_xpath).map(|path| (StrategyKind::XPath, path))
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Single-quoted CSS string with `\` and `'` escaped.
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Unvalidated locators for `element`, in priority order. Duplicate locator
/// strings (relative and absolute XPath can coincide) keep the first.
pub fn synthesize(element: &ElementProperties) -> Vec<LocatorCandidate> {
    let mut out: Vec<LocatorCandidate> = Vec::with_capacity(SynthesisKind::ORDER.len());
    for kind in SynthesisKind::ORDER {
        let Some((strategy, value)) = kind.build(element) else {
            continue;
        };
        let candidate = LocatorCandidate::new(strategy, value, 0.0, CandidateSource::Structural)
            .with_stability(kind.stability())
            .with_priority(out.len() as u32 + 1)
            .with_reasoning(format!("structural match by {}", kind.label()));
        if out.iter().all(|existing| existing.locator != candidate.locator) {
            out.push(candidate);
        }
    }
    out
}
