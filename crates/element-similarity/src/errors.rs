use heal_core_types::HealError;
use thiserror::Error;

use crate::weights::{Metric, Property};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScorerError {
    #[error("metric '{metric}' cannot compare property '{property}'")]
    IncompatibleMetric { property: Property, metric: Metric },

    #[error("weight for '{property}' must be a finite, non-negative number (got {weight})")]
    InvalidWeight { property: Property, weight: f64 },

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

impl From<ScorerError> for HealError {
    fn from(value: ScorerError) -> Self {
        HealError::new(value.to_string())
    }
}
