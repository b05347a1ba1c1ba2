//! Locator candidates proposed as replacements for a broken locator.

use serde::{Deserialize, Serialize};

use crate::clamp_unit;
use crate::locator::{Locator, StrategyKind};

/// Producer that proposed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    FastPath,
    Structural,
    Generative,
    RulePattern,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::FastPath => "fast_path",
            CandidateSource::Structural => "structural",
            CandidateSource::Generative => "generative",
            CandidateSource::RulePattern => "rule_pattern",
        }
    }
}

/// Candidate locator with stability and confidence estimates.
///
/// `priority` sorts lower-first. `unique` is only ever true when the locator
/// resolved to exactly one element during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub locator: String,
    pub strategy: StrategyKind,
    pub priority: u32,
    pub stability_score: f64,
    pub confidence: f64,
    pub unique: bool,
    pub validation_count: usize,
    pub source: CandidateSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl LocatorCandidate {
    /// Create an unvalidated candidate for `strategy=value`.
    pub fn new(
        strategy: StrategyKind,
        value: impl Into<String>,
        confidence: f64,
        source: CandidateSource,
    ) -> Self {
        let locator = Locator::new(strategy, value).to_string();
        Self {
            locator,
            strategy,
            priority: 0,
            stability_score: strategy.default_stability(),
            confidence: clamp_unit(confidence),
            unique: false,
            validation_count: 0,
            source,
            reasoning: None,
        }
    }

    /// Build a candidate from a raw wire locator. Returns `None` for text that
    /// carries no recognised strategy prefix.
    pub fn from_wire(raw: &str, confidence: f64, source: CandidateSource) -> Option<Self> {
        match Locator::parse(raw) {
            Locator::Typed { strategy, value } => {
                Some(Self::new(strategy, value, confidence, source))
            }
            Locator::PlainText(_) => None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stability(mut self, stability: f64) -> Self {
        self.stability_score = clamp_unit(stability);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Record how many elements the locator resolved to.
    pub fn with_validation(mut self, resolved_count: usize) -> Self {
        self.validation_count = resolved_count;
        self.unique = resolved_count == 1;
        self
    }

    pub fn parsed(&self) -> Locator {
        Locator::parse(&self.locator)
    }

    /// Check if this is a high-confidence candidate (>= 0.8)
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_candidate_formats_wire_locator() {
        let candidate =
            LocatorCandidate::new(StrategyKind::Id, "submit", 0.9, CandidateSource::RulePattern);
        assert_eq!(candidate.locator, "id=submit");
        assert_eq!(candidate.stability_score, StrategyKind::Id.default_stability());
        assert!(!candidate.unique);
        assert!(candidate.is_high_confidence());
    }

    #[test]
    fn unique_requires_single_match() {
        let single = LocatorCandidate::new(StrategyKind::Css, ".btn", 1.0, CandidateSource::Structural)
            .with_validation(1);
        assert!(single.unique);
        assert_eq!(single.validation_count, 1);

        let many = single.clone().with_validation(3);
        assert!(!many.unique);
        assert_eq!(many.validation_count, 3);
    }

    #[test]
    fn scores_are_clamped() {
        let candidate =
            LocatorCandidate::new(StrategyKind::Name, "q", 1.4, CandidateSource::Generative)
                .with_stability(-1.0);
        assert_eq!(candidate.confidence, 1.0);
        assert_eq!(candidate.stability_score, 0.0);
    }

    #[test]
    fn from_wire_rejects_plain_text() {
        assert!(LocatorCandidate::from_wire("Log In", 0.5, CandidateSource::FastPath).is_none());
        let parsed =
            LocatorCandidate::from_wire("xpath=//a[@id='x']", 0.5, CandidateSource::FastPath)
                .unwrap();
        assert_eq!(parsed.strategy, StrategyKind::XPath);
        assert_eq!(parsed.locator, "xpath=//a[@id='x']");
    }
}
