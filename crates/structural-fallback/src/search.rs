//! Similarity-driven search for a replacement element and its locators.

use dom_snapshot::{resolve, Document, NodeId};
use element_similarity::SimilarityScorer;
use heal_core_types::{clamp_unit, ElementProperties, Locator, LocatorCandidate};
use serde::Serialize;
use tracing::{debug, info};

use crate::extract::{extract, extract_all};
use crate::strategies::synthesize;
use crate::validate::validate_all;

pub const DEFAULT_TOP_K: usize = 3;

/// Unique locators needed for the full uniqueness bonus.
const UNIQUE_LOCATOR_SATURATION: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    TargetNotFound,
    NoSimilarElements,
    NoValidatedLocators,
    InvalidDocument,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::TargetNotFound => "target_not_found",
            NotFoundReason::NoSimilarElements => "no_similar_elements",
            NotFoundReason::NoValidatedLocators => "no_validated_locators",
            NotFoundReason::InvalidDocument => "invalid_document",
        }
    }
}

/// A current-document element scored against the target, with the
/// locators that validated for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub node: NodeId,
    pub properties: ElementProperties,
    pub similarity_score: f64,
    /// Validated locators in priority order.
    pub locators: Vec<LocatorCandidate>,
}

impl MatchCandidate {
    pub fn unique_locator_count(&self) -> usize {
        self.locators.iter().filter(|c| c.unique).count()
    }

    /// Highest-priority unique locator, else the highest-priority one.
    pub fn best_locator(&self) -> Option<&LocatorCandidate> {
        self.locators
            .iter()
            .find(|c| c.unique)
            .or_else(|| self.locators.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackMatch {
    pub best_locator: LocatorCandidate,
    pub all_validated_locators: Vec<LocatorCandidate>,
    pub similarity_score: f64,
    pub confidence: f64,
    pub candidates_evaluated: usize,
    pub target: ElementProperties,
    pub element: ElementProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FallbackOutcome {
    Found(Box<FallbackMatch>),
    NotFound {
        reason: NotFoundReason,
        candidates_evaluated: usize,
    },
}

impl FallbackOutcome {
    fn not_found(reason: NotFoundReason, candidates_evaluated: usize) -> Self {
        FallbackOutcome::NotFound {
            reason,
            candidates_evaluated,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FallbackOutcome::Found(_))
    }

    pub fn matched(&self) -> Option<&FallbackMatch> {
        match self {
            FallbackOutcome::Found(found) => Some(found),
            FallbackOutcome::NotFound { .. } => None,
        }
    }

    pub fn best_locator(&self) -> Option<&LocatorCandidate> {
        self.matched().map(|found| &found.best_locator)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.matched().map(|found| found.confidence)
    }

    pub fn reason(&self) -> Option<NotFoundReason> {
        match self {
            FallbackOutcome::Found(_) => None,
            FallbackOutcome::NotFound { reason, .. } => Some(*reason),
        }
    }

    pub fn candidates_evaluated(&self) -> usize {
        match self {
            FallbackOutcome::Found(found) => found.candidates_evaluated,
            FallbackOutcome::NotFound {
                candidates_evaluated,
                ..
            } => *candidates_evaluated,
        }
    }
}

/// `0.6 * similarity + 0.2 * min(unique / 3, 1) + 0.2 * (1 if top unique else 0.5)`.
pub fn aggregate_confidence(similarity: f64, unique_locators: usize, top_is_unique: bool) -> f64 {
    let uniqueness = (unique_locators as f64 / UNIQUE_LOCATOR_SATURATION).min(1.0);
    let top = if top_is_unique { 1.0 } else { 0.5 };
    clamp_unit(0.6 * similarity + 0.2 * uniqueness + 0.2 * top)
}

#[derive(Debug, Clone, Default)]
pub struct StructuralFallbackSearch {
    scorer: SimilarityScorer,
}

impl StructuralFallbackSearch {
    pub fn new(scorer: SimilarityScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Find the element in `current_document` that best replaces the one
    /// `old_locator` addressed in `old_document`. Documents are HTML or JSON
    /// DOM snapshots. Failures are reported in the outcome, never raised.
    pub fn find_similar_element(
        &self,
        old_locator: &str,
        old_document: &str,
        current_document: &str,
        top_k: usize,
    ) -> FallbackOutcome {
        let (old, current) = match (Document::load(old_document), Document::load(current_document))
        {
            (Ok(old), Ok(current)) => (old, current),
            (Err(err), _) | (_, Err(err)) => {
                debug!(target: "structural-fallback", error = %err, "document rejected");
                return FallbackOutcome::not_found(NotFoundReason::InvalidDocument, 0);
            }
        };
        self.find_in_documents(&Locator::parse(old_locator), &old, &current, top_k)
    }

    pub fn find_in_documents(
        &self,
        old_locator: &Locator,
        old: &Document,
        current: &Document,
        top_k: usize,
    ) -> FallbackOutcome {
        let target_node = match resolve(old, old_locator) {
            Ok(found) if !found.is_empty() => found[0],
            Ok(_) => return FallbackOutcome::not_found(NotFoundReason::TargetNotFound, 0),
            Err(err) => {
                debug!(target: "structural-fallback", locator = %old_locator, error = %err, "old locator unusable");
                return FallbackOutcome::not_found(NotFoundReason::TargetNotFound, 0);
            }
        };
        let target = extract(old, target_node);

        let elements = extract_all(current);
        let evaluated = elements.len();
        let ranked = self
            .scorer
            .rank_candidates(&target, elements.iter().map(|(_, props)| props), top_k);
        let mut matches: Vec<MatchCandidate> = ranked
            .into_iter()
            .filter(|scored| scored.score > 0.0)
            .map(|scored| {
                let (node, properties) = elements[scored.index].clone();
                let locators = validate_all(current, synthesize(&properties), node);
                MatchCandidate {
                    node,
                    properties,
                    similarity_score: scored.score,
                    locators,
                }
            })
            .collect();
        if matches.is_empty() {
            return FallbackOutcome::not_found(NotFoundReason::NoSimilarElements, evaluated);
        }

        matches.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then_with(|| b.unique_locator_count().cmp(&a.unique_locator_count()))
        });
        let Some(winner) = matches.into_iter().find(|m| !m.locators.is_empty()) else {
            return FallbackOutcome::not_found(NotFoundReason::NoValidatedLocators, evaluated);
        };
        let Some(best) = winner.best_locator().cloned() else {
            return FallbackOutcome::not_found(NotFoundReason::NoValidatedLocators, evaluated);
        };

        let confidence = aggregate_confidence(
            winner.similarity_score,
            winner.unique_locator_count(),
            best.unique,
        );
        info!(
            target: "structural-fallback",
            locator = %best.locator,
            similarity = winner.similarity_score,
            confidence,
            evaluated,
            "structural match found"
        );
        FallbackOutcome::Found(Box::new(FallbackMatch {
            best_locator: best,
            all_validated_locators: winner.locators,
            similarity_score: winner.similarity_score,
            confidence,
            candidates_evaluated: evaluated,
            target,
            element: winner.properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_formula() {
        assert!((aggregate_confidence(1.0, 3, true) - 1.0).abs() < 1e-12);
        assert!((aggregate_confidence(0.5, 0, false) - 0.4).abs() < 1e-12);
        assert!((aggregate_confidence(0.8, 1, true) - (0.48 + 0.2 / 3.0 + 0.2)).abs() < 1e-12);
        assert!(aggregate_confidence(1.0, 30, true) <= 1.0);
    }

    #[test]
    fn missing_target_is_reported() {
        let search = StructuralFallbackSearch::default();
        let outcome = search.find_similar_element(
            "id=gone",
            "<body><p>x</p></body>",
            "<body><p>x</p></body>",
            DEFAULT_TOP_K,
        );
        assert_eq!(outcome.reason(), Some(NotFoundReason::TargetNotFound));
        assert_eq!(outcome.candidates_evaluated(), 0);

        let bad_selector =
            search.find_similar_element("css=p +", "<p>x</p>", "<p>x</p>", DEFAULT_TOP_K);
        assert_eq!(bad_selector.reason(), Some(NotFoundReason::TargetNotFound));
    }

    #[test]
    fn malformed_snapshot_is_invalid_document() {
        let search = StructuralFallbackSearch::default();
        let outcome = search.find_similar_element("id=a", "<p id='a'>x</p>", "{ broken", 3);
        assert_eq!(outcome.reason(), Some(NotFoundReason::InvalidDocument));
    }

    #[test]
    fn empty_current_document_has_no_similar_elements() {
        let search = StructuralFallbackSearch::default();
        let outcome = search.find_similar_element("id=a", "<p id='a'>x</p>", "", 3);
        assert_eq!(outcome.reason(), Some(NotFoundReason::NoSimilarElements));
    }

    #[test]
    fn unaddressable_winner_has_no_validated_locators() {
        let search = StructuralFallbackSearch::default();
        let outcome = search.find_similar_element(
            "Hello",
            "<x:widget>Hello</x:widget>",
            "<x:widget>Hello</x:widget>",
            3,
        );
        assert_eq!(outcome.reason(), Some(NotFoundReason::NoValidatedLocators));
        assert_eq!(outcome.candidates_evaluated(), 1);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = FallbackOutcome::not_found(NotFoundReason::NoSimilarElements, 4);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["reason"], "no_similar_elements");
        assert_eq!(json["candidates_evaluated"], 4);
    }
}
