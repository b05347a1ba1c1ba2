//! Locator resolution against a [`Document`].

use heal_core_types::{Locator, StrategyKind};

use crate::css::SelectorList;
use crate::document::{normalize_whitespace, Document, NodeId};
use crate::errors::QueryError;
use crate::xpath::XPath;

/// Resolve `locator` to the matching elements in document order.
pub fn resolve(doc: &Document, locator: &Locator) -> Result<Vec<NodeId>, QueryError> {
    let value = locator.value();
    if value.trim().is_empty() {
        return Err(QueryError::EmptyValue);
    }
    let Some(strategy) = locator.strategy() else {
        return Ok(by_plain_text(doc, value));
    };
    let found = match strategy {
        StrategyKind::Id => by_attribute(doc, "id", value),
        StrategyKind::Name => by_attribute(doc, "name", value),
        StrategyKind::ClassName => doc
            .elements()
            .filter(|id| doc.has_class(*id, value.trim()))
            .collect(),
        StrategyKind::TagName => {
            let tag = value.trim().to_ascii_lowercase();
            doc.elements()
                .filter(|id| doc.tag(*id) == Some(tag.as_str()))
                .collect()
        }
        StrategyKind::LinkText => {
            let wanted = normalize_whitespace(value);
            links(doc)
                .filter(|id| doc.normalized_text(*id) == wanted)
                .collect()
        }
        StrategyKind::PartialLinkText => {
            let wanted = normalize_whitespace(value);
            links(doc)
                .filter(|id| doc.normalized_text(*id).contains(&wanted))
                .collect()
        }
        StrategyKind::Css => SelectorList::parse(value)?.select(doc),
        StrategyKind::XPath => XPath::parse(value)?.select(doc),
    };
    Ok(found)
}

/// Parse a wire-form locator string and resolve it.
pub fn resolve_str(doc: &Document, raw: &str) -> Result<Vec<NodeId>, QueryError> {
    resolve(doc, &Locator::parse(raw))
}

fn by_attribute(doc: &Document, name: &str, value: &str) -> Vec<NodeId> {
    doc.elements()
        .filter(|id| doc.attr(*id, name) == Some(value))
        .collect()
}

fn links(doc: &Document) -> impl Iterator<Item = NodeId> + '_ {
    doc.elements().filter(move |id| doc.tag(*id) == Some("a"))
}

/// Innermost elements whose visible text equals `text`, falling back to
/// innermost elements containing it.
fn by_plain_text(doc: &Document, text: &str) -> Vec<NodeId> {
    let wanted = normalize_whitespace(text);
    let exact: Vec<NodeId> = doc
        .elements()
        .filter(|id| doc.normalized_text(*id) == wanted)
        .collect();
    if !exact.is_empty() {
        return innermost(doc, exact);
    }
    let partial: Vec<NodeId> = doc
        .elements()
        .filter(|id| doc.normalized_text(*id).contains(&wanted))
        .collect();
    innermost(doc, partial)
}

fn innermost(doc: &Document, matches: Vec<NodeId>) -> Vec<NodeId> {
    matches
        .iter()
        .copied()
        .filter(|candidate| {
            !matches
                .iter()
                .any(|other| other != candidate && doc.is_ancestor(*candidate, *other))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;

    fn doc() -> Document {
        html::parse(
            r#"<html><body>
                <form id="login-form">
                    <input id="username" name="username" class="field">
                    <input id="password" name="password" type="password" class="field secret">
                    <button id="login-btn" class="btn btn-primary" aria-label="Submit login form"><span>Log In</span></button>
                </form>
                <p>Need help? <a href="/help">Contact support</a></p>
            </body></html>"#,
        )
    }

    #[test]
    fn typed_strategies() {
        let doc = doc();
        assert_eq!(resolve_str(&doc, "id=login-btn").unwrap().len(), 1);
        assert_eq!(resolve_str(&doc, "name=password").unwrap().len(), 1);
        assert_eq!(resolve_str(&doc, "class_name=field").unwrap().len(), 2);
        assert_eq!(resolve_str(&doc, "tag_name=INPUT").unwrap().len(), 2);
        assert_eq!(resolve_str(&doc, "link_text=Contact support").unwrap().len(), 1);
        assert_eq!(resolve_str(&doc, "partial_link_text=support").unwrap().len(), 1);
        assert_eq!(resolve_str(&doc, "css=#login-form .secret").unwrap().len(), 1);
        assert_eq!(
            resolve_str(&doc, "xpath=//button[@aria-label='Submit login form']")
                .unwrap()
                .len(),
            1
        );
        assert!(resolve_str(&doc, "id=missing").unwrap().is_empty());
    }

    #[test]
    fn plain_text_prefers_innermost_exact_match() {
        let doc = doc();
        let found = resolve_str(&doc, "Log In").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(doc.tag(found[0]), Some("span"));

        let partial = resolve_str(&doc, "Need help").unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(doc.tag(partial[0]), Some("p"));
    }

    #[test]
    fn invalid_and_empty_locators_error() {
        let doc = doc();
        assert_eq!(resolve_str(&doc, "id=  "), Err(QueryError::EmptyValue));
        assert!(matches!(
            resolve_str(&doc, "css=a + b"),
            Err(QueryError::InvalidCss { .. })
        ));
        assert!(matches!(
            resolve_str(&doc, "xpath=//a["),
            Err(QueryError::InvalidXPath { .. })
        ));
    }
}
