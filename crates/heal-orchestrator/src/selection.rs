use heal_core_types::{LocatorCandidate, StrategyKind};

use crate::model::ValidationResult;

/// `0.5 * confidence + 0.3 * stability + 0.2 * strategy bonus`.
pub fn selection_score(confidence: f64, stability: f64, strategy: StrategyKind) -> f64 {
    0.5 * confidence + 0.3 * stability + 0.2 * strategy.strategy_bonus()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: LocatorCandidate,
    pub validation: ValidationResult,
    pub score: f64,
}

/// Best valid candidate whose validation confidence reaches `threshold`.
/// Equal scores keep the earlier candidate.
pub fn select_best(
    validated: &[(LocatorCandidate, ValidationResult)],
    threshold: f64,
) -> Option<Selection> {
    let mut best: Option<Selection> = None;
    for (candidate, validation) in validated {
        if !validation.is_valid || validation.confidence_score < threshold {
            continue;
        }
        let score = selection_score(
            validation.confidence_score,
            candidate.stability_score,
            candidate.strategy,
        );
        if best.as_ref().map_or(true, |current| score > current.score) {
            best = Some(Selection {
                candidate: candidate.clone(),
                validation: validation.clone(),
                score,
            });
        }
    }
    best
}
