//! Failure analysis: the structured summary every producer works from.

use serde::Serialize;

use heal_core_types::{FailureContext, FailureType, Locator, StrategyKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureAnalysis {
    pub original: Locator,
    pub strategy: Option<StrategyKind>,
    pub failure_type: FailureType,
    pub healable: bool,
    /// Identifier words found in the locator value, lowercased, first
    /// occurrence order.
    pub tokens: Vec<String>,
    pub expected_tag: Option<String>,
    pub summary: String,
}

impl FailureAnalysis {
    pub fn analyze(failure: &FailureContext, expected_tag: Option<&str>) -> Self {
        let original = Locator::parse(&failure.original_locator);
        let strategy = original.strategy();
        let tokens = locator_tokens(&original);
        let expected_tag = expected_tag
            .map(|tag| tag.trim().to_ascii_lowercase())
            .filter(|tag| !tag.is_empty())
            .or_else(|| infer_tag(&original));
        let healable = failure.failure_type.is_healable();
        let summary = format!(
            "{} on {} ({}) in {}::{}",
            failure.failure_type.as_str(),
            failure.original_locator,
            strategy.map_or("text", |s| s.prefix()),
            failure.test_file,
            failure.test_case,
        );
        Self {
            original,
            strategy,
            failure_type: failure.failure_type,
            healable,
            tokens,
            expected_tag,
            summary,
        }
    }
}

/// Split a locator value into identifier words on punctuation, `-`, `_`
/// and camelCase boundaries.
pub fn locator_tokens(locator: &Locator) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for chunk in locator
        .value()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|chunk| !chunk.is_empty())
    {
        for word in split_camel_case(chunk) {
            let word = word.to_lowercase();
            if !tokens.contains(&word) {
                tokens.push(word);
            }
        }
    }
    tokens
}

fn split_camel_case(chunk: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = chunk.char_indices().collect();
    for window in chars.windows(2) {
        let (_, prev) = window[0];
        let (index, next) = window[1];
        let boundary = (prev.is_lowercase() || prev.is_ascii_digit()) && next.is_uppercase();
        if boundary {
            words.push(&chunk[start..index]);
            start = index;
        }
    }
    words.push(&chunk[start..]);
    words
}

/// Tag the locator names explicitly, if any.
fn infer_tag(locator: &Locator) -> Option<String> {
    let Locator::Typed { strategy, value } = locator else {
        return None;
    };
    let leading_ident = |text: &str| -> Option<String> {
        let tag: String = text
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
            .collect();
        (!tag.is_empty()).then(|| tag.to_ascii_lowercase())
    };
    match strategy {
        StrategyKind::TagName => leading_ident(value.trim()),
        StrategyKind::LinkText | StrategyKind::PartialLinkText => Some("a".into()),
        StrategyKind::Css => {
            let last = value.split([' ', '>']).filter(|s| !s.is_empty()).last()?;
            leading_ident(last)
        }
        StrategyKind::XPath => leading_ident(last_xpath_step(value)),
        _ => None,
    }
}

/// Text after the last `/` that sits outside predicates.
fn last_xpath_step(path: &str) -> &str {
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in path.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => start = index + 1,
            _ => {}
        }
    }
    &path[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(locator: &str, failure_type: FailureType) -> FailureContext {
        FailureContext::new("tests/login.rs", "test_login", locator, failure_type)
    }

    #[test]
    fn tokens_split_on_separators_and_camel_case() {
        let tokens = locator_tokens(&Locator::parse("id=loginSubmit-btn_primary2"));
        assert_eq!(tokens, vec!["login", "submit", "btn", "primary2"]);
        let tokens = locator_tokens(&Locator::parse("xpath=//*[@id='userName']"));
        assert_eq!(tokens, vec!["id", "user", "name"]);
    }

    #[test]
    fn expected_tag_is_inferred_from_locator() {
        let analysis = FailureAnalysis::analyze(
            &failure("css=form > button.primary", FailureType::ElementNotFound),
            None,
        );
        assert_eq!(analysis.expected_tag.as_deref(), Some("button"));
        let analysis = FailureAnalysis::analyze(
            &failure("xpath=//div/a[@href='/x']", FailureType::ElementNotFound),
            None,
        );
        assert_eq!(analysis.expected_tag.as_deref(), Some("a"));
        let analysis = FailureAnalysis::analyze(
            &failure("id=submit", FailureType::ElementNotFound),
            Some(" BUTTON "),
        );
        assert_eq!(analysis.expected_tag.as_deref(), Some("button"));
        let analysis = FailureAnalysis::analyze(
            &failure("css=#submit", FailureType::ElementNotFound),
            None,
        );
        assert_eq!(analysis.expected_tag, None);
    }

    #[test]
    fn summary_and_healability() {
        let analysis =
            FailureAnalysis::analyze(&failure("id=submit", FailureType::StaleElement), None);
        assert!(analysis.healable);
        assert_eq!(analysis.strategy, Some(StrategyKind::Id));
        assert_eq!(
            analysis.summary,
            "STALE_ELEMENT on id=submit (id) in tests/login.rs::test_login"
        );
        let other = FailureAnalysis::analyze(&failure("Log In", FailureType::Other), None);
        assert!(!other.healable);
        assert_eq!(other.strategy, None);
    }
}
