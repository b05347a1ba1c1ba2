use thiserror::Error;

use heal_core_types::{HealError, SessionId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("session {0} already finished")]
    AlreadyFinished(SessionId),
    #[error("session {0} is still running")]
    StillRunning(SessionId),
    #[error("invalid healing policy: {0}")]
    InvalidPolicy(String),
    #[error("missing collaborator: {0}")]
    MissingPort(&'static str),
    #[error("no async runtime available to run the session")]
    NoRuntime,
}

impl From<OrchestratorError> for HealError {
    fn from(err: OrchestratorError) -> Self {
        HealError::new(err.to_string())
    }
}
