use heal_core_types::HealError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomError {
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("invalid css selector '{selector}': {reason}")]
    InvalidCss { selector: String, reason: String },

    #[error("invalid xpath '{expr}': {reason}")]
    InvalidXPath { expr: String, reason: String },

    #[error("empty locator value")]
    EmptyValue,
}

impl QueryError {
    pub fn css(selector: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidCss {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    pub fn xpath(expr: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidXPath {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<DomError> for HealError {
    fn from(value: DomError) -> Self {
        HealError::new(value.to_string())
    }
}

impl From<QueryError> for HealError {
    fn from(value: QueryError) -> Self {
        HealError::new(value.to_string())
    }
}
