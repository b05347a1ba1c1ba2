//! Healing session orchestration.
//!
//! A session analyses a locator failure, runs the candidate cascade
//! (fast path, structural, generative, rule patterns), validates the
//! candidates in a live session, selects the best one and optionally
//! rewrites the test source through a code updater.

pub mod analysis;
pub mod cascade;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod producers;
pub mod registry;
pub mod report;
pub mod retry;
pub mod rules;
pub mod selection;
pub mod snapshot_session;

pub use analysis::FailureAnalysis;
pub use cascade::{rank_and_dedup, Cascade, CascadeReport, CascadeThresholds, ProducerRun};
pub use errors::OrchestratorError;
pub use events::{HealEvent, InMemoryEventSink, EVENT_QUEUE_CAPACITY};
pub use metrics::HealMetrics;
pub use model::{
    CodeUpdateResult, DocumentPair, HealRequest, HealingPhase, HealingSession, HealingStatus,
    HealthStatus, LocatorAttempt, PhaseTiming, ProgressUpdate, ValidationResult,
};
pub use orchestrator::{
    HealingOrchestrator, OrchestratorBuilder, ABANDONED_MESSAGE, NO_CANDIDATES_MESSAGE,
    NO_VALID_CANDIDATES_MESSAGE,
};
pub use policy::HealingPolicy;
pub use ports::{
    CodeUpdater, EventsPort, GeneratedLocator, GenerativeProducer, LiveSession,
    LiveSessionGuard, LiveSessionPort, VisionLocator, VisionObjective, VisionTaskPort,
};
pub use producers::{
    CandidateProducer, FastPathProducer, GenerativeStage, ProducerContext, RulePatternProducer,
    StructuralProducer,
};
pub use registry::{ProgressCallback, CANCELLED_MESSAGE};
pub use report::HealingReport;
pub use retry::{PollPolicy, PollStatus, RetryPolicy};
pub use selection::{select_best, selection_score, Selection};
pub use snapshot_session::{validate_in_document, SnapshotSessionPort};
