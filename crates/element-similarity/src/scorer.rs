//! Weighted similarity scoring.

use std::collections::{BTreeMap, HashMap};

use heal_core_types::{clamp_unit, ElementProperties};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::ScorerError;
use crate::metrics::{self, DEFAULT_LAMBDA};
use crate::weights::{Metric, Property, PropertyValue, WeightOverride, WeightTable};

/// Minimum score for [`SimilarityScorer::find_best_match`].
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Serialisable scorer settings; `weights` and `metrics` merge over the
/// default table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub lambda: f64,
    pub threshold: f64,
    pub weights: BTreeMap<Property, f64>,
    pub metrics: BTreeMap<Property, Metric>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_LAMBDA,
            threshold: DEFAULT_THRESHOLD,
            weights: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }
}

impl SimilarityConfig {
    pub fn overrides(&self) -> Vec<(Property, WeightOverride)> {
        let mut merged: BTreeMap<Property, WeightOverride> = BTreeMap::new();
        for (property, weight) in &self.weights {
            merged.entry(*property).or_default().weight = Some(*weight);
        }
        for (property, metric) in &self.metrics {
            merged.entry(*property).or_default().metric = Some(*metric);
        }
        merged.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// Position in the candidate sequence that was scored.
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub property: Property,
    pub metric: Metric,
    pub weight: f64,
    pub similarity: f64,
}

/// Per-property detail behind one score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub applied_weight: f64,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    table: WeightTable,
    lambda: f64,
    threshold: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(WeightTable::default())
    }
}

impl SimilarityScorer {
    pub fn new(table: WeightTable) -> Self {
        Self {
            table,
            lambda: DEFAULT_LAMBDA,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn from_config(config: &SimilarityConfig) -> Result<Self, ScorerError> {
        let table = WeightTable::with_overrides(config.overrides())?;
        Self::new(table)
            .with_lambda(config.lambda)?
            .with_threshold(config.threshold)
    }

    pub fn with_lambda(mut self, lambda: f64) -> Result<Self, ScorerError> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(ScorerError::InvalidParameter {
                name: "lambda",
                value: lambda,
            });
        }
        self.lambda = lambda;
        Ok(self)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, ScorerError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScorerError::InvalidParameter {
                name: "threshold",
                value: threshold,
            });
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn table(&self) -> &WeightTable {
        &self.table
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Start a scoring session whose edit-distance memo spans several calls.
    pub fn session(&self) -> ScoringSession<'_> {
        ScoringSession {
            scorer: self,
            levenshtein: HashMap::new(),
        }
    }

    pub fn score(&self, target: &ElementProperties, candidate: &ElementProperties) -> f64 {
        self.session().score(target, candidate)
    }

    pub fn score_breakdown(
        &self,
        target: &ElementProperties,
        candidate: &ElementProperties,
    ) -> ScoreBreakdown {
        self.session().breakdown(target, candidate)
    }

    /// Highest-scoring candidate at or above the configured threshold. The
    /// first candidate wins ties.
    pub fn find_best_match<'c, I>(
        &self,
        target: &ElementProperties,
        candidates: I,
    ) -> Option<ScoredCandidate>
    where
        I: IntoIterator<Item = &'c ElementProperties>,
    {
        self.find_best_match_above(target, candidates, self.threshold)
    }

    pub fn find_best_match_above<'c, I>(
        &self,
        target: &ElementProperties,
        candidates: I,
        threshold: f64,
    ) -> Option<ScoredCandidate>
    where
        I: IntoIterator<Item = &'c ElementProperties>,
    {
        let mut session = self.session();
        let mut best: Option<ScoredCandidate> = None;
        for (index, candidate) in candidates.into_iter().enumerate() {
            let score = session.score(target, candidate);
            if best.map_or(true, |current| score > current.score) {
                best = Some(ScoredCandidate { index, score });
            }
        }
        best.filter(|found| found.score >= threshold)
    }

    /// Candidates ordered by descending score, ties kept in input order,
    /// truncated to `top_k`.
    pub fn rank_candidates<'c, I>(
        &self,
        target: &ElementProperties,
        candidates: I,
        top_k: usize,
    ) -> Vec<ScoredCandidate>
    where
        I: IntoIterator<Item = &'c ElementProperties>,
    {
        let mut session = self.session();
        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| ScoredCandidate {
                index,
                score: session.score(target, candidate),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        trace!(
            target: "element-similarity",
            ranked = ranked.len(),
            memo = session.cached_pairs(),
            "ranked candidates"
        );
        ranked
    }
}

/// One scoring pass over many pairs, memoising edit distances by string
/// pair.
pub struct ScoringSession<'a> {
    scorer: &'a SimilarityScorer,
    levenshtein: HashMap<(String, String), f64>,
}

impl<'a> ScoringSession<'a> {
    pub fn score(&mut self, target: &ElementProperties, candidate: &ElementProperties) -> f64 {
        self.evaluate(target, candidate, |_| {})
    }

    pub fn breakdown(
        &mut self,
        target: &ElementProperties,
        candidate: &ElementProperties,
    ) -> ScoreBreakdown {
        let mut contributions = Vec::new();
        let score = self.evaluate(target, candidate, |item| contributions.push(item));
        ScoreBreakdown {
            score,
            applied_weight: contributions.iter().map(|item| item.weight).sum(),
            contributions,
        }
    }

    pub fn cached_pairs(&self) -> usize {
        self.levenshtein.len()
    }

    fn evaluate(
        &mut self,
        target: &ElementProperties,
        candidate: &ElementProperties,
        mut record: impl FnMut(Contribution),
    ) -> f64 {
        let scorer = self.scorer;
        let mut weighted = 0.0;
        let mut applied = 0.0;
        for entry in scorer.table.active() {
            let left = entry.property.value(target);
            let right = entry.property.value(candidate);
            if !left.is_present() && !right.is_present() {
                continue;
            }
            let similarity = clamp_unit(self.similarity(entry.metric, &left, &right));
            weighted += entry.weight * similarity;
            applied += entry.weight;
            record(Contribution {
                property: entry.property,
                metric: entry.metric,
                weight: entry.weight,
                similarity,
            });
        }
        if applied <= 0.0 {
            return 0.0;
        }
        clamp_unit(weighted / applied)
    }

    fn similarity(&mut self, metric: Metric, left: &PropertyValue<'_>, right: &PropertyValue<'_>) -> f64 {
        use PropertyValue as V;
        match (metric, left, right) {
            (Metric::Equality, V::Text(a), V::Text(b)) => metrics::equality(a, b),
            (Metric::Levenshtein, V::Text(a), V::Text(b)) => self.levenshtein(a, b),
            (Metric::JaccardChars, V::Text(a), V::Text(b)) => metrics::jaccard_chars(a, b),
            (Metric::JaroWinkler, V::Text(a), V::Text(b)) => metrics::jaro_winkler(a, b),
            (Metric::TokenSet, V::Text(a), V::Text(b)) => metrics::token_set(a, b),
            (Metric::ListSet, V::List(a), V::List(b)) => metrics::list_set(a, b),
            (Metric::SpatialDecay, V::Coordinate(a, _), V::Coordinate(b, _)) => {
                metrics::spatial_decay((*a, 0.0), (*b, 0.0), self.scorer.lambda)
            }
            (Metric::AreaRatio, V::Area(a), V::Area(b)) => metrics::area_ratio(*a, *b),
            (Metric::Boolean, V::Flag(a), V::Flag(b)) => metrics::boolean(*a, *b),
            (Metric::KeyValue, V::Map(a), V::Map(b)) => metrics::key_value(a, b),
            _ => 0.0,
        }
    }

    fn levenshtein(&mut self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        *self
            .levenshtein
            .entry(key)
            .or_insert_with(|| metrics::normalized_levenshtein(a, b))
    }
}
