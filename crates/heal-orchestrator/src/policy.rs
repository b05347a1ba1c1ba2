use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::retry::{PollPolicy, RetryPolicy};

/// Tunables for healing sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingPolicy {
    /// Minimum validation confidence a candidate needs to be selected.
    pub confidence_threshold: f64,
    pub max_alternatives: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_sessions: usize,
    pub session_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Upper bound for a single collaborator call.
    pub producer_timeout_ms: u64,
    pub fast_path_short_circuit: usize,
    pub structural_short_circuit: usize,
    pub rule_based_floor: usize,
    pub structural_top_k: usize,
    pub auto_update: bool,
}

impl Default for HealingPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_alternatives: 10,
            max_retries: 3,
            retry_delay_ms: 2000,
            max_concurrent_sessions: 5,
            session_timeout_ms: 300_000,
            poll_interval_ms: 2000,
            max_poll_attempts: 30,
            producer_timeout_ms: 60_000,
            fast_path_short_circuit: 3,
            structural_short_circuit: 2,
            rule_based_floor: 2,
            structural_top_k: 3,
            auto_update: true,
        }
    }
}

impl HealingPolicy {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(OrchestratorError::InvalidPolicy(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_alternatives == 0 {
            return Err(OrchestratorError::InvalidPolicy(
                "max_alternatives must be positive".into(),
            ));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(OrchestratorError::InvalidPolicy(
                "max_concurrent_sessions must be positive".into(),
            ));
        }
        if self.session_timeout_ms == 0 || self.producer_timeout_ms == 0 {
            return Err(OrchestratorError::InvalidPolicy(
                "timeouts must be positive".into(),
            ));
        }
        if self.max_poll_attempts == 0 {
            return Err(OrchestratorError::InvalidPolicy(
                "max_poll_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.producer_timeout_ms),
        )
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            self.max_poll_attempts,
        )
    }
}
