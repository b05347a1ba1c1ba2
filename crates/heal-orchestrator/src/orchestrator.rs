//! Healing session workflow: analysis, generation, validation and update.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dom_snapshot::Document;
use element_similarity::SimilarityScorer;
use heal_core_types::{HealError, LocatorCandidate, SessionId};
use structural_fallback::StructuralFallbackSearch;

use crate::analysis::FailureAnalysis;
use crate::cascade::{Cascade, CascadeThresholds};
use crate::errors::OrchestratorError;
use crate::events::{EventDispatcher, HealEvent, EVENT_QUEUE_CAPACITY};
use crate::metrics::HealMetrics;
use crate::model::{
    HealRequest, HealingPhase, HealingSession, HealingStatus, HealthStatus, LocatorAttempt,
    PhaseTiming, ProgressUpdate, ValidationResult,
};
use crate::policy::HealingPolicy;
use crate::ports::{
    CodeUpdater, EventsPort, GenerativeProducer, LiveSessionGuard, LiveSessionPort,
    VisionTaskPort,
};
use crate::producers::{
    FastPathProducer, GenerativeStage, ProducerContext, RulePatternProducer, StructuralProducer,
};
use crate::registry::SessionRegistry;
use crate::report::HealingReport;
use crate::retry::RetryPolicy;
use crate::selection::{select_best, Selection};
use crate::snapshot_session::SnapshotSessionPort;

pub const NO_CANDIDATES_MESSAGE: &str = "No alternative locators generated";
pub const NO_VALID_CANDIDATES_MESSAGE: &str = "No valid alternative locators found";
pub const ABANDONED_MESSAGE: &str = "Healing abandoned before completion";

#[derive(Default)]
pub struct OrchestratorBuilder {
    policy: HealingPolicy,
    scorer: Option<SimilarityScorer>,
    fast_path: Option<Arc<dyn VisionTaskPort>>,
    generative: Option<Arc<dyn GenerativeProducer>>,
    live: Option<Arc<dyn LiveSessionPort>>,
    updater: Option<Arc<dyn CodeUpdater>>,
    events: Option<Arc<dyn EventsPort>>,
    metrics: Option<Arc<HealMetrics>>,
}

impl OrchestratorBuilder {
    pub fn policy(mut self, policy: HealingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn similarity(mut self, scorer: SimilarityScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn fast_path(mut self, port: Arc<dyn VisionTaskPort>) -> Self {
        self.fast_path = Some(port);
        self
    }

    pub fn generative(mut self, port: Arc<dyn GenerativeProducer>) -> Self {
        self.generative = Some(port);
        self
    }

    /// Without a live port, candidates are validated against the request's
    /// current document.
    pub fn live_sessions(mut self, port: Arc<dyn LiveSessionPort>) -> Self {
        self.live = Some(port);
        self
    }

    pub fn code_updater(mut self, port: Arc<dyn CodeUpdater>) -> Self {
        self.updater = Some(port);
        self
    }

    pub fn events(mut self, port: Arc<dyn EventsPort>) -> Self {
        self.events = Some(port);
        self
    }

    pub fn metrics(mut self, metrics: Arc<HealMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<HealingOrchestrator, OrchestratorError> {
        self.policy.validate()?;
        if self.policy.auto_update && self.updater.is_none() {
            return Err(OrchestratorError::MissingPort("code updater"));
        }

        let search = StructuralFallbackSearch::new(self.scorer.unwrap_or_default());
        let mut cascade = Cascade::new(
            CascadeThresholds::from(&self.policy),
            self.policy.max_alternatives,
        )
        .with_structural(Arc::new(StructuralProducer::new(search)))
        .with_rules(Arc::new(RulePatternProducer));
        if let Some(port) = self.fast_path {
            cascade = cascade.with_fast_path(Arc::new(FastPathProducer::new(port)));
        }
        if let Some(port) = self.generative {
            cascade = cascade.with_generative(Arc::new(GenerativeStage::new(port)));
        }

        Ok(HealingOrchestrator {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(self.policy.max_concurrent_sessions)),
                policy: self.policy,
                registry: SessionRegistry::new(),
                cascade,
                live: self.live,
                updater: self.updater,
                events: self
                    .events
                    .map(|port| EventDispatcher::new(port, EVENT_QUEUE_CAPACITY)),
                metrics: self.metrics,
            }),
        })
    }
}

/// Runs healing sessions, each as an independent task bounded by the
/// concurrency limit.
#[derive(Clone)]
pub struct HealingOrchestrator {
    inner: Arc<Inner>,
}

impl HealingOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn policy(&self) -> &HealingPolicy {
        &self.inner.policy
    }

    /// Register a session and schedule its workflow on the current runtime.
    pub fn start_healing(&self, request: HealRequest) -> Result<SessionId, OrchestratorError> {
        let handle = Handle::try_current().map_err(|_| OrchestratorError::NoRuntime)?;
        let (id, cancel) = self.register(&request);
        let inner = self.inner.clone();
        let task_id = id.clone();
        handle.spawn(async move {
            inner.run_session(task_id, request, cancel).await;
        });
        Ok(id)
    }

    /// Run a session to completion on the calling task.
    pub async fn heal(&self, request: HealRequest) -> Result<HealingSession, OrchestratorError> {
        let (id, cancel) = self.register(&request);
        self.inner.run_session(id.clone(), request, cancel).await;
        self.inner
            .registry
            .get(&id)
            .ok_or(OrchestratorError::UnknownSession(id))
    }

    fn register(&self, request: &HealRequest) -> (SessionId, CancellationToken) {
        let session = HealingSession::new(request.failure.clone());
        let id = session.session_id.clone();
        let cancel = CancellationToken::new();
        self.inner.registry.insert(session, cancel.clone());
        debug!(target: "heal-orchestrator", session_id = %id, "session registered");
        (id, cancel)
    }

    pub fn session(&self, id: &SessionId) -> Option<HealingSession> {
        self.inner.registry.get(id)
    }

    pub fn sessions(&self) -> Vec<HealingSession> {
        self.inner.registry.list()
    }

    /// Fail a running session immediately. In-flight collaborator calls are
    /// abandoned once the workflow observes the token.
    pub fn cancel(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        let session = self.inner.registry.cancel(id)?;
        if let Some(metrics) = &self.inner.metrics {
            metrics.sessions_cancelled.inc();
        }
        info!(target: "heal-orchestrator", session_id = %id, "session cancelled");
        Ok(session)
    }

    pub fn register_progress_callback<F>(
        &self,
        id: &SessionId,
        callback: F,
    ) -> Result<(), OrchestratorError>
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.inner.registry.add_callback(id, Arc::new(callback))
    }

    pub fn health(&self) -> HealthStatus {
        let active_sessions = self.inner.registry.active_count();
        let max_concurrent_sessions = self.inner.policy.max_concurrent_sessions;
        HealthStatus {
            active_sessions,
            max_concurrent_sessions,
            healthy: active_sessions <= max_concurrent_sessions,
        }
    }

    /// Wait for the session's workflow to finish and return the final state.
    pub async fn wait(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        self.inner.registry.wait_settled(id).await
    }

    /// Remove a finished session from the registry for archival.
    pub fn take_finished(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        self.inner.registry.take_finished(id)
    }

    pub fn report(&self, id: &SessionId) -> Option<String> {
        self.session(id)
            .map(|session| HealingReport::new(&session).to_string())
    }
}

struct Inner {
    policy: HealingPolicy,
    registry: SessionRegistry,
    permits: Arc<Semaphore>,
    cascade: Cascade,
    live: Option<Arc<dyn LiveSessionPort>>,
    updater: Option<Arc<dyn CodeUpdater>>,
    events: Option<EventDispatcher>,
    metrics: Option<Arc<HealMetrics>>,
}

enum WorkflowEnd {
    Healed { locator: String, confidence: f64 },
    Failed(String),
    TimedOut(Duration),
    Cancelled,
}

impl Inner {
    async fn run_session(&self, id: SessionId, request: HealRequest, cancel: CancellationToken) {
        let clock = Instant::now();
        let abandoned = AbandonGuard {
            inner: self,
            id: &id,
            clock,
            armed: true,
        };
        let admitted = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };
        let end = match admitted {
            Some(permit) => {
                let end = self.run_admitted(&id, &request, &cancel).await;
                drop(permit);
                end
            }
            None if cancel.is_cancelled() => WorkflowEnd::Cancelled,
            None => WorkflowEnd::Failed("Session admission closed".into()),
        };
        self.finalize(&id, end, clock.elapsed());
        abandoned.disarm();
    }

    async fn run_admitted(
        &self,
        id: &SessionId,
        request: &HealRequest,
        cancel: &CancellationToken,
    ) -> WorkflowEnd {
        if !self
            .registry
            .update(id, |s| s.status = HealingStatus::InProgress)
        {
            return WorkflowEnd::Cancelled;
        }
        if let Some(metrics) = &self.metrics {
            metrics.sessions_started.inc();
        }
        info!(
            target: "heal-orchestrator",
            session_id = %id,
            locator = %request.failure.original_locator,
            "healing session started"
        );
        self.emit(HealEvent::SessionStarted {
            session_id: id.clone(),
            original_locator: request.failure.original_locator.clone(),
            at: Utc::now(),
        });

        let limit = self.policy.session_timeout();
        let workflow = Workflow {
            inner: self,
            id,
            request,
            cancel,
        };
        tokio::select! {
            _ = cancel.cancelled() => WorkflowEnd::Cancelled,
            outcome = tokio::time::timeout(limit, workflow.run()) => {
                outcome.unwrap_or(WorkflowEnd::TimedOut(limit))
            }
        }
    }

    fn finalize(&self, id: &SessionId, end: WorkflowEnd, elapsed: Duration) {
        let finished = match end {
            WorkflowEnd::Healed {
                locator,
                confidence,
            } => self.registry.finish(id, HealingStatus::Success, |s| {
                s.successful_locator = Some(locator);
                s.confidence_score = confidence;
                s.progress = 1.0;
            }),
            WorkflowEnd::Failed(message) => self
                .registry
                .finish(id, HealingStatus::Failed, |s| s.error_message = Some(message)),
            WorkflowEnd::TimedOut(limit) => self.registry.finish(id, HealingStatus::Timeout, |s| {
                s.error_message = Some(format!(
                    "Healing timed out after {}s",
                    limit.as_secs_f64()
                ))
            }),
            WorkflowEnd::Cancelled => None,
        };
        if let (Some(session), Some(metrics)) = (&finished, &self.metrics) {
            metrics.record_finished(session.status, elapsed.as_secs_f64());
        }

        if let Some(session) = self.registry.get(id) {
            match session.status {
                HealingStatus::Success => info!(
                    target: "heal-orchestrator",
                    session_id = %id,
                    locator = session.successful_locator.as_deref().unwrap_or_default(),
                    confidence = session.confidence_score,
                    attempts = session.attempts.len(),
                    "healing session succeeded"
                ),
                status => warn!(
                    target: "heal-orchestrator",
                    session_id = %id,
                    status = status.as_str(),
                    error = session.error_message.as_deref().unwrap_or_default(),
                    "healing session did not heal"
                ),
            }
            self.registry.notify(&ProgressUpdate {
                session_id: id.clone(),
                status: session.status,
                phase: session.current_phase.clone(),
                progress: session.progress,
                message: session
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "completed".to_string()),
            });
            self.emit(HealEvent::SessionFinished {
                session_id: id.clone(),
                status: session.status,
                successful_locator: session.successful_locator.clone(),
                error_message: session.error_message.clone(),
                seconds: elapsed.as_secs_f64(),
            });
        }
        self.registry.settle(id);
    }

    fn emit(&self, event: HealEvent) {
        if let Some(events) = &self.events {
            events.dispatch(event);
        }
    }

    fn on_retry(&self, call: &'static str) -> impl FnMut(u32, &HealError) + '_ {
        move |_, _| {
            if let Some(metrics) = &self.metrics {
                metrics.record_retry(call);
            }
        }
    }
}

/// Fails the session when its workflow future is dropped before it finishes,
/// for example when the caller of [`HealingOrchestrator::heal`] stops polling
/// or the runtime shuts down.
struct AbandonGuard<'a> {
    inner: &'a Inner,
    id: &'a SessionId,
    clock: Instant,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(target: "heal-orchestrator", session_id = %self.id, "healing session abandoned");
        self.inner.finalize(
            self.id,
            WorkflowEnd::Failed(ABANDONED_MESSAGE.to_string()),
            self.clock.elapsed(),
        );
    }
}

struct PhaseClock {
    phase: HealingPhase,
    started: Instant,
}

/// One session's pass through the phases. Only this value mutates the
/// session while it runs.
struct Workflow<'a> {
    inner: &'a Inner,
    id: &'a SessionId,
    request: &'a HealRequest,
    cancel: &'a CancellationToken,
}

impl Workflow<'_> {
    async fn run(&self) -> WorkflowEnd {
        let phase = self.enter(HealingPhase::Analysis);
        let analysis = FailureAnalysis::analyze(
            &self.request.failure,
            self.request.expected_tag.as_deref(),
        );
        self.leave(phase);
        if !analysis.healable {
            return WorkflowEnd::Failed(format!(
                "Failure type {} is not healable",
                analysis.failure_type.as_str()
            ));
        }

        let phase = self.enter(HealingPhase::Generation);
        let policy = &self.inner.policy;
        let retry = policy.retry_policy();
        let poll = policy.poll_policy();
        let ctx = ProducerContext {
            request: self.request,
            analysis: &analysis,
            retry: &retry,
            poll: &poll,
            cancel: self.cancel,
            metrics: self.inner.metrics.as_deref(),
            structural_top_k: policy.structural_top_k,
        };
        let report = self.inner.cascade.run(&ctx).await;
        let candidates = report.candidates;
        self.inner
            .registry
            .update(self.id, |s| s.candidates = candidates.clone());
        self.leave(phase);
        if candidates.is_empty() {
            return WorkflowEnd::Failed(NO_CANDIDATES_MESSAGE.into());
        }

        let phase = self.enter(HealingPhase::Validation);
        let validated = match self.validate(&candidates, &analysis, &retry).await {
            Ok(validated) => validated,
            Err(message) => return WorkflowEnd::Failed(message),
        };
        self.leave(phase);
        let Some(selection) = select_best(&validated, policy.confidence_threshold) else {
            return WorkflowEnd::Failed(NO_VALID_CANDIDATES_MESSAGE.into());
        };
        info!(
            target: "heal-orchestrator",
            session_id = %self.id,
            locator = %selection.candidate.locator,
            score = selection.score,
            "alternative selected"
        );

        if !policy.auto_update {
            return WorkflowEnd::Healed {
                locator: selection.candidate.locator,
                confidence: selection.validation.confidence_score,
            };
        }
        let phase = self.enter(HealingPhase::Update);
        let end = self.update(selection, &retry).await;
        self.leave(phase);
        end
    }

    fn enter(&self, phase: HealingPhase) -> PhaseClock {
        let (start, _) = phase.progress_range();
        self.progress(phase, start, format!("{} started", phase.as_str()));
        debug!(target: "heal-orchestrator", session_id = %self.id, phase = phase.as_str(), "phase started");
        self.inner.emit(HealEvent::PhaseStarted {
            session_id: self.id.clone(),
            phase,
        });
        PhaseClock {
            phase,
            started: Instant::now(),
        }
    }

    fn leave(&self, clock: PhaseClock) {
        let seconds = clock.started.elapsed().as_secs_f64();
        let phase = clock.phase;
        self.inner.registry.update(self.id, |s| {
            s.timings.push(PhaseTiming { phase, seconds })
        });
        let (_, end) = phase.progress_range();
        self.progress(phase, end, format!("{} completed", phase.as_str()));
        self.inner.emit(HealEvent::PhaseCompleted {
            session_id: self.id.clone(),
            phase,
            seconds,
        });
    }

    /// Record progress (never decreasing) and notify callbacks.
    fn progress(&self, phase: HealingPhase, progress: f64, message: String) {
        let mut snapshot = None;
        self.inner.registry.update(self.id, |s| {
            s.progress = s.progress.max(progress);
            s.current_phase = phase.as_str().to_string();
            snapshot = Some((s.status, s.progress));
        });
        if let Some((status, progress)) = snapshot {
            self.inner.registry.notify(&ProgressUpdate {
                session_id: self.id.clone(),
                status,
                phase: phase.as_str().to_string(),
                progress,
                message,
            });
        }
    }

    async fn open_live_session(&self, retry: &RetryPolicy) -> Result<LiveSessionGuard, String> {
        let port: Arc<dyn LiveSessionPort> = match (&self.inner.live, &self.request.documents) {
            (Some(port), _) => port.clone(),
            (None, Some(documents)) => {
                let source = documents.current.clone();
                match tokio::task::spawn_blocking(move || Document::load(&source)).await {
                    Ok(Ok(document)) => Arc::new(SnapshotSessionPort::new(document)),
                    Ok(Err(err)) => {
                        return Err(format!("Current document unusable for validation: {err}"))
                    }
                    Err(err) => return Err(format!("Current document could not be loaded: {err}")),
                }
            }
            (None, None) => return Err("No live session available for validation".into()),
        };
        let url = self.request.failure.target_url.as_str();
        let session = retry
            .run(
                "live session open",
                self.cancel,
                || port.open(url),
                self.inner.on_retry("live_session"),
            )
            .await
            .map_err(|err| format!("Live session unavailable: {err}"))?;
        Ok(LiveSessionGuard::new(session))
    }

    async fn validate(
        &self,
        candidates: &[LocatorCandidate],
        analysis: &FailureAnalysis,
        retry: &RetryPolicy,
    ) -> Result<Vec<(LocatorCandidate, ValidationResult)>, String> {
        let guard = self.open_live_session(retry).await?;
        let (start, end) = HealingPhase::Validation.progress_range();
        let expected_tag = analysis.expected_tag.as_deref();
        let mut validated = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let clock = Instant::now();
            let result = retry
                .run(
                    "live validation",
                    self.cancel,
                    || {
                        guard.session().validate_locator(
                            &candidate.locator,
                            candidate.strategy,
                            expected_tag,
                        )
                    },
                    self.inner.on_retry("live_session"),
                )
                .await
                .unwrap_or_else(|err| ValidationResult::invalid(err.to_string()));

            let attempt = LocatorAttempt {
                locator: candidate.locator.clone(),
                strategy: candidate.strategy,
                success: result.is_valid,
                confidence_score: result.confidence_score,
                error_message: result.error_message.clone(),
                execution_time_seconds: clock.elapsed().as_secs_f64(),
                timestamp: Utc::now(),
            };
            let recorded = self
                .inner
                .registry
                .update(self.id, |s| s.attempts.push(attempt.clone()));
            if recorded {
                if let Some(metrics) = &self.inner.metrics {
                    metrics.validation_attempts.inc();
                }
                self.inner.emit(HealEvent::AttemptRecorded {
                    session_id: self.id.clone(),
                    attempt,
                });
            }
            validated.push((candidate.clone(), result));

            let done = (index + 1) as f64 / candidates.len() as f64;
            self.progress(
                HealingPhase::Validation,
                start + (end - start) * done,
                format!("validated {}", candidate.locator),
            );
        }
        Ok(validated)
    }

    async fn update(&self, selection: Selection, retry: &RetryPolicy) -> WorkflowEnd {
        let Some(updater) = &self.inner.updater else {
            return WorkflowEnd::Failed("No code updater configured".into());
        };
        let failure = &self.request.failure;
        let new_locator = selection.candidate.locator.as_str();
        let outcome = retry
            .run(
                "code update",
                self.cancel,
                || updater.update_locator(&failure.test_file, &failure.original_locator, new_locator),
                self.inner.on_retry("code_update"),
            )
            .await;
        match outcome {
            Ok(result) => {
                let success = result.success;
                let message = result.error_message.clone();
                self.inner
                    .registry
                    .update(self.id, |s| s.update = Some(result));
                if success {
                    WorkflowEnd::Healed {
                        locator: selection.candidate.locator,
                        confidence: selection.validation.confidence_score,
                    }
                } else {
                    WorkflowEnd::Failed(message.unwrap_or_else(|| "Code update failed".into()))
                }
            }
            Err(err) => WorkflowEnd::Failed(format!("Code update failed: {err}")),
        }
    }
}
