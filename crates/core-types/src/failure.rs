//! Failure descriptions handed over by the failure detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    ElementNotFound,
    ElementNotInteractable,
    Timeout,
    StaleElement,
    Other,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::ElementNotFound => "ELEMENT_NOT_FOUND",
            FailureType::ElementNotInteractable => "ELEMENT_NOT_INTERACTABLE",
            FailureType::Timeout => "TIMEOUT",
            FailureType::StaleElement => "STALE_ELEMENT",
            FailureType::Other => "OTHER",
        }
    }

    /// Only locator-shaped failures are worth healing.
    pub fn is_healable(&self) -> bool {
        !matches!(self, FailureType::Other)
    }

    /// Map a driver exception onto a failure type.
    pub fn classify(exception_type: &str, message: &str) -> Self {
        let exception = exception_type.to_ascii_lowercase();
        let message = message.to_ascii_lowercase();
        if exception.contains("nosuchelement") || message.contains("unable to locate element") {
            FailureType::ElementNotFound
        } else if exception.contains("notinteractable")
            || exception.contains("clickintercepted")
            || message.contains("not interactable")
        {
            FailureType::ElementNotInteractable
        } else if exception.contains("stale") {
            FailureType::StaleElement
        } else if exception.contains("timeout") || message.contains("timed out") {
            FailureType::Timeout
        } else {
            FailureType::Other
        }
    }
}

/// Why healing was triggered. Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub test_file: String,
    pub test_case: String,
    pub failing_step: String,
    pub original_locator: String,
    pub target_url: String,
    pub exception_type: String,
    pub exception_message: String,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub failure_type: FailureType,
}

impl FailureContext {
    pub fn new(
        test_file: impl Into<String>,
        test_case: impl Into<String>,
        original_locator: impl Into<String>,
        failure_type: FailureType,
    ) -> Self {
        Self {
            test_file: test_file.into(),
            test_case: test_case.into(),
            failing_step: String::new(),
            original_locator: original_locator.into(),
            target_url: String::new(),
            exception_type: String::new(),
            exception_message: String::new(),
            timestamp: Utc::now(),
            run_id: String::new(),
            failure_type,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.failing_step = step.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = url.into();
        self
    }

    pub fn with_exception(mut self, kind: impl Into<String>, message: impl Into<String>) -> Self {
        self.exception_type = kind.into();
        self.exception_message = message.into();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}
