//! Session model shared by the orchestrator, its registry and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use heal_core_types::{FailureContext, LocatorCandidate, SessionId, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealingStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Timeout,
}

impl HealingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingStatus::Pending => "PENDING",
            HealingStatus::InProgress => "IN_PROGRESS",
            HealingStatus::Success => "SUCCESS",
            HealingStatus::Failed => "FAILED",
            HealingStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HealingStatus::Success | HealingStatus::Failed | HealingStatus::Timeout
        )
    }
}

/// Sequential phases of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingPhase {
    Analysis,
    Generation,
    Validation,
    Update,
}

impl HealingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingPhase::Analysis => "analysis",
            HealingPhase::Generation => "generation",
            HealingPhase::Validation => "validation",
            HealingPhase::Update => "update",
        }
    }

    /// Progress band `(start, end)` the phase covers.
    pub fn progress_range(&self) -> (f64, f64) {
        match self {
            HealingPhase::Analysis => (0.0, 0.2),
            HealingPhase::Generation => (0.2, 0.5),
            HealingPhase::Validation => (0.5, 0.8),
            HealingPhase::Update => (0.8, 1.0),
        }
    }
}

/// One live validation of a candidate locator. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorAttempt {
    pub locator: String,
    pub strategy: StrategyKind,
    pub success: bool,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: HealingPhase,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingSession {
    pub session_id: SessionId,
    pub failure: FailureContext,
    pub status: HealingStatus,
    pub attempts: Vec<LocatorAttempt>,
    pub progress: f64,
    pub current_phase: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub successful_locator: Option<String>,
    pub confidence_score: f64,
    pub error_message: Option<String>,
    pub timings: Vec<PhaseTiming>,
    /// Alternatives produced by the generation cascade, ranked.
    pub candidates: Vec<LocatorCandidate>,
    pub update: Option<CodeUpdateResult>,
}

impl HealingSession {
    pub fn new(failure: FailureContext) -> Self {
        Self {
            session_id: SessionId::new(),
            failure,
            status: HealingStatus::Pending,
            attempts: Vec::new(),
            progress: 0.0,
            current_phase: String::new(),
            started_at: Utc::now(),
            completed_at: None,
            successful_locator: None,
            confidence_score: 0.0,
            error_message: None,
            timings: Vec::new(),
            candidates: Vec::new(),
            update: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at)
            .to_std()
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn timing(&self, phase: HealingPhase) -> Option<f64> {
        self.timings
            .iter()
            .find(|timing| timing.phase == phase)
            .map(|timing| timing.seconds)
    }
}

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub session_id: SessionId,
    pub status: HealingStatus,
    pub phase: String,
    pub progress: f64,
    pub message: String,
}

/// Verdict of the live session on one locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub element_found: bool,
    pub is_interactable: bool,
    pub matches_expected_type: bool,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ValidationResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            element_found: false,
            is_interactable: false,
            matches_expected_type: false,
            confidence_score: 0.0,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUpdateResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Page source before the break and as it is now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPair {
    pub old: String,
    pub current: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealRequest {
    pub failure: FailureContext,
    #[serde(default)]
    pub documents: Option<DocumentPair>,
    /// Tag the healed locator should resolve to, when known.
    #[serde(default)]
    pub expected_tag: Option<String>,
}

impl HealRequest {
    pub fn new(failure: FailureContext) -> Self {
        Self {
            failure,
            documents: None,
            expected_tag: None,
        }
    }

    pub fn with_documents(mut self, old: impl Into<String>, current: impl Into<String>) -> Self {
        self.documents = Some(DocumentPair {
            old: old.into(),
            current: current.into(),
        });
        self
    }

    pub fn with_expected_tag(mut self, tag: impl Into<String>) -> Self {
        self.expected_tag = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub active_sessions: usize,
    pub max_concurrent_sessions: usize,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use heal_core_types::FailureType;

    #[test]
    fn terminal_states() {
        assert!(!HealingStatus::Pending.is_terminal());
        assert!(!HealingStatus::InProgress.is_terminal());
        assert!(HealingStatus::Success.is_terminal());
        assert!(HealingStatus::Failed.is_terminal());
        assert!(HealingStatus::Timeout.is_terminal());
        assert_eq!(
            serde_json::to_string(&HealingStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }

    #[test]
    fn phase_bands_are_contiguous() {
        let phases = [
            HealingPhase::Analysis,
            HealingPhase::Generation,
            HealingPhase::Validation,
            HealingPhase::Update,
        ];
        assert_eq!(phases[0].progress_range().0, 0.0);
        assert_eq!(phases[3].progress_range().1, 1.0);
        for pair in phases.windows(2) {
            assert_eq!(pair[0].progress_range().1, pair[1].progress_range().0);
        }
    }

    #[test]
    fn new_session_is_pending() {
        let session = HealingSession::new(FailureContext::new(
            "tests/login.rs",
            "login",
            "id=login",
            FailureType::ElementNotFound,
        ));
        assert_eq!(session.status, HealingStatus::Pending);
        assert!(session.attempts.is_empty());
        assert!(session.completed_at.is_none());
        assert_eq!(session.timing(HealingPhase::Analysis), None);
    }
}
