//! Validation of synthesized locators against the current document.

use dom_snapshot::{resolve, Document, NodeId, QueryError};
use heal_core_types::{clamp_unit, LocatorCandidate};
use tracing::trace;

pub const UNIQUE_CONFIDENCE: f64 = 1.0;
pub const AMBIGUOUS_CONFIDENCE: f64 = 0.7;

/// Outcome of resolving one locator against a document for a given node.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorCheck {
    /// Resolves to `count` elements, the expected node among them.
    Matched { count: usize },
    /// Resolves, but not to the expected node.
    WrongElement { count: usize },
    NoMatch,
    Invalid(QueryError),
}

impl LocatorCheck {
    pub fn is_match(&self) -> bool {
        matches!(self, LocatorCheck::Matched { .. })
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, LocatorCheck::Matched { count: 1 })
    }
}

pub fn check(doc: &Document, candidate: &LocatorCandidate, node: NodeId) -> LocatorCheck {
    match resolve(doc, &candidate.parsed()) {
        Err(err) => LocatorCheck::Invalid(err),
        Ok(found) if found.is_empty() => LocatorCheck::NoMatch,
        Ok(found) if found.contains(&node) => LocatorCheck::Matched { count: found.len() },
        Ok(found) => LocatorCheck::WrongElement { count: found.len() },
    }
}

/// Validate `candidate` for `node`. Returns the candidate with its
/// uniqueness and confidence filled in, or `None` when it does not reach
/// the node.
pub fn validate(
    doc: &Document,
    candidate: LocatorCandidate,
    node: NodeId,
) -> Option<LocatorCandidate> {
    match check(doc, &candidate, node) {
        LocatorCheck::Matched { count } => {
            let mut validated = candidate.with_validation(count);
            validated.confidence = clamp_unit(if validated.unique {
                UNIQUE_CONFIDENCE
            } else {
                AMBIGUOUS_CONFIDENCE
            });
            Some(validated)
        }
        other => {
            trace!(
                target: "structural-fallback",
                locator = %candidate.locator,
                outcome = ?other,
                "locator rejected"
            );
            None
        }
    }
}

/// Validate every candidate, keeping the survivors in their input order.
pub fn validate_all(
    doc: &Document,
    candidates: Vec<LocatorCandidate>,
    node: NodeId,
) -> Vec<LocatorCandidate> {
    candidates
        .into_iter()
        .filter_map(|candidate| validate(doc, candidate, node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use heal_core_types::{CandidateSource, StrategyKind};

    fn doc() -> Document {
        Document::parse_html(
            r#"<body><button class="btn">One</button><button class="btn">Two</button><p id="x">x</p></body>"#,
        )
    }

    fn buttons(doc: &Document) -> Vec<NodeId> {
        doc.elements()
            .filter(|id| doc.tag(*id) == Some("button"))
            .collect()
    }

    fn candidate(strategy: StrategyKind, value: &str) -> LocatorCandidate {
        LocatorCandidate::new(strategy, value, 0.0, CandidateSource::Structural)
    }

    #[test]
    fn unique_and_ambiguous_locators() {
        let doc = doc();
        let second = buttons(&doc)[1];
        let unique = validate(
            &doc,
            candidate(StrategyKind::XPath, "//button[text()='Two']"),
            second,
        )
        .unwrap();
        assert!(unique.unique);
        assert_eq!(unique.validation_count, 1);
        assert_eq!(unique.confidence, 1.0);

        let shared = validate(&doc, candidate(StrategyKind::Css, "button.btn"), second).unwrap();
        assert!(!shared.unique);
        assert_eq!(shared.validation_count, 2);
        assert_eq!(shared.confidence, 0.7);
    }

    #[test]
    fn rejects_locators_that_miss_the_node() {
        let doc = doc();
        let first = buttons(&doc)[0];
        let wrong = candidate(StrategyKind::Id, "x");
        assert_eq!(check(&doc, &wrong, first), LocatorCheck::WrongElement { count: 1 });
        assert!(validate(&doc, wrong, first).is_none());
        assert_eq!(
            check(&doc, &candidate(StrategyKind::Id, "nope"), first),
            LocatorCheck::NoMatch
        );
        assert!(matches!(
            check(&doc, &candidate(StrategyKind::Css, "a +"), first),
            LocatorCheck::Invalid(_)
        ));
    }

    #[test]
    fn revalidating_a_unique_locator_stays_unique() {
        let doc = doc();
        let first = buttons(&doc)[0];
        let once = validate(
            &doc,
            candidate(StrategyKind::XPath, "//button[1]"),
            first,
        )
        .unwrap();
        assert!(once.unique);
        let twice = validate(&doc, once.clone(), first).unwrap();
        assert!(twice.unique);
        assert_eq!(twice, once);
    }

    #[test]
    fn validate_all_keeps_order() {
        let doc = doc();
        let first = buttons(&doc)[0];
        let kept = validate_all(
            &doc,
            vec![
                candidate(StrategyKind::Css, "button.btn"),
                candidate(StrategyKind::Id, "x"),
                candidate(StrategyKind::XPath, "//button[text()='One']"),
            ],
            first,
        );
        let locators: Vec<&str> = kept.iter().map(|c| c.locator.as_str()).collect();
        assert_eq!(locators, vec!["css=button.btn", "xpath=//button[text()='One']"]);
    }
}
