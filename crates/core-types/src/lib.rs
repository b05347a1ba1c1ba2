//! Shared primitives for the locator healing kernel.
//!
//! Everything that crosses a crate boundary lives here: the shared error
//! type, identifiers, the locator wire grammar, element snapshots and
//! candidate records.

pub mod candidate;
pub mod element;
pub mod error;
pub mod failure;
pub mod locator;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use candidate::{CandidateSource, LocatorCandidate};
pub use element::ElementProperties;
pub use error::HealError;
pub use failure::{FailureContext, FailureType};
pub use locator::{Locator, StrategyKind};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clamp a score into the closed unit interval, mapping NaN to zero.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_str());
    }

    #[test]
    fn clamp_unit_handles_edges() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }
}
