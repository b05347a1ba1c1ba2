//! Multi-metric similarity between two element snapshots.
//!
//! A score is a weighted mean over `(property, metric, weight)` entries.
//! Entries with zero weight, and entries where neither side carries a
//! value, are left out of both numerator and denominator.

pub mod errors;
pub mod metrics;
pub mod scorer;
pub mod weights;

pub use errors::ScorerError;
pub use scorer::{
    Contribution, ScoreBreakdown, ScoredCandidate, ScoringSession, SimilarityConfig,
    SimilarityScorer, DEFAULT_THRESHOLD,
};
pub use weights::{Metric, Property, ValueKind, WeightEntry, WeightOverride, WeightTable};
