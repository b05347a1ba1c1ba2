//! Structural fallback search.
//!
//! Locates the element an old locator addressed in an earlier document,
//! finds the most similar elements in the current document, synthesizes
//! locators for each and keeps the ones that resolve back to it.

pub mod extract;
pub mod search;
pub mod strategies;
pub mod validate;

pub use extract::{extract, extract_all, is_candidate};
pub use search::{
    aggregate_confidence, FallbackMatch, FallbackOutcome, MatchCandidate, NotFoundReason,
    StructuralFallbackSearch, DEFAULT_TOP_K,
};
pub use strategies::{synthesize, SynthesisKind};
pub use validate::{check, validate, validate_all, LocatorCheck};
