//! External collaborators the orchestrator drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use heal_core_types::{HealError, StrategyKind};

use crate::analysis::FailureAnalysis;
use crate::events::HealEvent;
use crate::model::{CodeUpdateResult, ValidationResult};
use crate::retry::PollStatus;

/// What the fast-path vision service is asked to find.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionObjective {
    pub original_locator: String,
    pub target_url: String,
    pub description: String,
    pub expected_tag: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionLocator {
    pub locator: String,
    pub confidence: f64,
}

/// Fast external lookup working as submit-then-poll.
#[async_trait]
pub trait VisionTaskPort: Send + Sync {
    async fn submit(&self, objective: &VisionObjective) -> Result<String, HealError>;
    async fn poll(&self, task_id: &str) -> Result<PollStatus<Vec<VisionLocator>>, HealError>;
}

/// Candidate record returned by the generative producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedLocator {
    /// Either a full `<prefix>=<value>` locator or a bare value for
    /// `strategy`.
    pub locator: String,
    pub strategy: StrategyKind,
    pub confidence: f64,
    pub stability_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[async_trait]
pub trait GenerativeProducer: Send + Sync {
    async fn generate(&self, analysis: &FailureAnalysis)
        -> Result<Vec<GeneratedLocator>, HealError>;
}

/// Opens live browsing sessions used to validate candidates.
#[async_trait]
pub trait LiveSessionPort: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn LiveSession>, HealError>;
}

#[async_trait]
pub trait LiveSession: Send + Sync {
    async fn validate_locator(
        &self,
        locator: &str,
        strategy: StrategyKind,
        expected_tag: Option<&str>,
    ) -> Result<ValidationResult, HealError>;

    /// Tear the session down. Called exactly once, from a drop guard, so it
    /// must not block.
    fn release(&self);
}

#[async_trait]
pub trait CodeUpdater: Send + Sync {
    async fn update_locator(
        &self,
        file: &str,
        old_locator: &str,
        new_locator: &str,
    ) -> Result<CodeUpdateResult, HealError>;
}

/// Audit/alerting sink. Emission failures never fail a session.
#[async_trait]
pub trait EventsPort: Send + Sync {
    async fn emit(&self, event: &HealEvent) -> Result<(), HealError>;
}

/// Releases the live session on every exit path, cancellation included.
pub struct LiveSessionGuard {
    session: Box<dyn LiveSession>,
}

impl LiveSessionGuard {
    pub fn new(session: Box<dyn LiveSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &dyn LiveSession {
        self.session.as_ref()
    }
}

impl Drop for LiveSessionGuard {
    fn drop(&mut self) {
        self.session.release();
    }
}
