//! Crate-level errors for configuration, telemetry and the offline facade.

use dom_snapshot::DomError;
use element_similarity::ScorerError;
use heal_core_types::HealError;
use heal_orchestrator::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unsupported config path: {0}")]
    UnsupportedPath(String),
    #[error("invalid value for {path}: {message}")]
    InvalidValue { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum LocatorHealError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scorer(#[from] ScorerError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Document(#[from] DomError),
    #[error("telemetry: {0}")]
    Telemetry(String),
}

impl From<ConfigError> for HealError {
    fn from(value: ConfigError) -> Self {
        HealError::new(value.to_string())
    }
}

impl From<LocatorHealError> for HealError {
    fn from(value: LocatorHealError) -> Self {
        match value {
            LocatorHealError::Orchestrator(err) => err.into(),
            other => HealError::new(other.to_string()),
        }
    }
}
