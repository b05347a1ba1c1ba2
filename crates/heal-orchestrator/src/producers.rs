//! Candidate producers run by the generation cascade.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use heal_core_types::{
    clamp_unit, CandidateSource, HealError, Locator, LocatorCandidate,
};
use structural_fallback::{FallbackOutcome, StructuralFallbackSearch};

use crate::analysis::FailureAnalysis;
use crate::metrics::HealMetrics;
use crate::model::HealRequest;
use crate::ports::{GeneratedLocator, GenerativeProducer, VisionObjective, VisionTaskPort};
use crate::retry::{PollPolicy, RetryPolicy};
use crate::rules::rule_candidates;

/// Everything a producer may consult for one session.
pub struct ProducerContext<'a> {
    pub request: &'a HealRequest,
    pub analysis: &'a FailureAnalysis,
    pub retry: &'a RetryPolicy,
    pub poll: &'a PollPolicy,
    pub cancel: &'a CancellationToken,
    pub metrics: Option<&'a HealMetrics>,
    pub structural_top_k: usize,
}

impl ProducerContext<'_> {
    fn on_retry(&self, source: CandidateSource) -> impl FnMut(u32, &HealError) + '_ {
        move |_, _| {
            if let Some(metrics) = self.metrics {
                metrics.record_retry(source.as_str());
            }
        }
    }
}

#[async_trait]
pub trait CandidateProducer: Send + Sync {
    fn source(&self) -> CandidateSource;

    async fn produce(&self, ctx: &ProducerContext<'_>)
        -> Result<Vec<LocatorCandidate>, HealError>;
}

/// External vision service, polled until it reports back.
pub struct FastPathProducer {
    port: Arc<dyn VisionTaskPort>,
}

impl FastPathProducer {
    pub fn new(port: Arc<dyn VisionTaskPort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl CandidateProducer for FastPathProducer {
    fn source(&self) -> CandidateSource {
        CandidateSource::FastPath
    }

    async fn produce(
        &self,
        ctx: &ProducerContext<'_>,
    ) -> Result<Vec<LocatorCandidate>, HealError> {
        let objective = VisionObjective {
            original_locator: ctx.request.failure.original_locator.clone(),
            target_url: ctx.request.failure.target_url.clone(),
            description: ctx.analysis.summary.clone(),
            expected_tag: ctx.analysis.expected_tag.clone(),
        };
        let task_id = ctx
            .retry
            .run(
                "vision submit",
                ctx.cancel,
                || self.port.submit(&objective),
                ctx.on_retry(self.source()),
            )
            .await?;
        debug!(target: "heal-orchestrator", task_id = %task_id, "vision task submitted");

        let found = ctx
            .poll
            .poll_until("vision task", ctx.cancel, || {
                ctx.retry.run(
                    "vision poll",
                    ctx.cancel,
                    || self.port.poll(&task_id),
                    ctx.on_retry(self.source()),
                )
            })
            .await?;
        Ok(found
            .into_iter()
            .filter_map(|hit| {
                LocatorCandidate::from_wire(&hit.locator, hit.confidence, CandidateSource::FastPath)
            })
            .collect())
    }
}

/// Similarity search over the old and current page source.
pub struct StructuralProducer {
    search: Arc<StructuralFallbackSearch>,
}

impl StructuralProducer {
    pub fn new(search: StructuralFallbackSearch) -> Self {
        Self {
            search: Arc::new(search),
        }
    }
}

#[async_trait]
impl CandidateProducer for StructuralProducer {
    fn source(&self) -> CandidateSource {
        CandidateSource::Structural
    }

    async fn produce(
        &self,
        ctx: &ProducerContext<'_>,
    ) -> Result<Vec<LocatorCandidate>, HealError> {
        let Some(documents) = ctx.request.documents.as_ref() else {
            return Ok(Vec::new());
        };
        let search = self.search.clone();
        let locator = ctx.request.failure.original_locator.clone();
        let documents = documents.clone();
        let top_k = ctx.structural_top_k;
        // Parsing and scoring are CPU-bound and run on the blocking pool. A
        // cancelled or timed-out session stops waiting; the search itself runs
        // to completion in the background.
        let task = tokio::task::spawn_blocking(move || {
            search.find_similar_element(&locator, &documents.old, &documents.current, top_k)
        });
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(HealError::Cancelled),
            joined = task => joined
                .map_err(|err| HealError::new(format!("structural search aborted: {err}")))?,
        };
        match outcome {
            FallbackOutcome::Found(found) => Ok(found
                .all_validated_locators
                .into_iter()
                .map(|mut candidate| {
                    // Per-locator validation confidence scaled by the match.
                    candidate.confidence = clamp_unit(candidate.confidence * found.confidence);
                    candidate
                })
                .collect()),
            FallbackOutcome::NotFound {
                reason,
                candidates_evaluated,
            } => {
                debug!(
                    target: "heal-orchestrator",
                    reason = reason.as_str(),
                    candidates_evaluated,
                    "structural search found nothing"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Opaque generative service.
pub struct GenerativeStage {
    port: Arc<dyn GenerativeProducer>,
}

impl GenerativeStage {
    pub fn new(port: Arc<dyn GenerativeProducer>) -> Self {
        Self { port }
    }
}

fn generated_candidate(generated: GeneratedLocator) -> LocatorCandidate {
    let (strategy, value) = match Locator::parse(&generated.locator) {
        Locator::Typed { strategy, value } => (strategy, value),
        Locator::PlainText(value) => (generated.strategy, value),
    };
    let candidate = LocatorCandidate::new(
        strategy,
        value,
        generated.confidence,
        CandidateSource::Generative,
    )
    .with_stability(generated.stability_score);
    if generated.reasoning.is_empty() {
        candidate
    } else {
        candidate.with_reasoning(generated.reasoning)
    }
}

#[async_trait]
impl CandidateProducer for GenerativeStage {
    fn source(&self) -> CandidateSource {
        CandidateSource::Generative
    }

    async fn produce(
        &self,
        ctx: &ProducerContext<'_>,
    ) -> Result<Vec<LocatorCandidate>, HealError> {
        let generated = ctx
            .retry
            .run(
                "generative producer",
                ctx.cancel,
                || self.port.generate(ctx.analysis),
                ctx.on_retry(self.source()),
            )
            .await?;
        Ok(generated
            .into_iter()
            .filter(|g| !g.locator.trim().is_empty())
            .map(generated_candidate)
            .collect())
    }
}

/// Syntactic siblings of the original locator.
#[derive(Default)]
pub struct RulePatternProducer;

#[async_trait]
impl CandidateProducer for RulePatternProducer {
    fn source(&self) -> CandidateSource {
        CandidateSource::RulePattern
    }

    async fn produce(
        &self,
        ctx: &ProducerContext<'_>,
    ) -> Result<Vec<LocatorCandidate>, HealError> {
        Ok(rule_candidates(&ctx.analysis.original))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::PollStatus;
    use crate::ports::VisionLocator;
    use heal_core_types::{FailureContext, FailureType, StrategyKind};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn request(locator: &str) -> HealRequest {
        HealRequest::new(FailureContext::new(
            "tests/login.rs",
            "login",
            locator,
            FailureType::ElementNotFound,
        ))
    }

    async fn run(producer: &dyn CandidateProducer, request: &HealRequest) -> Vec<LocatorCandidate> {
        let analysis = FailureAnalysis::analyze(&request.failure, None);
        let retry = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(10));
        let poll = PollPolicy::new(Duration::from_secs(1), 3);
        let cancel = CancellationToken::new();
        let ctx = ProducerContext {
            request,
            analysis: &analysis,
            retry: &retry,
            poll: &poll,
            cancel: &cancel,
            metrics: None,
            structural_top_k: 3,
        };
        producer.produce(&ctx).await.unwrap()
    }

    struct Vision {
        polls: Mutex<u32>,
    }

    #[async_trait]
    impl VisionTaskPort for Vision {
        async fn submit(&self, _objective: &VisionObjective) -> Result<String, HealError> {
            Ok("task-1".into())
        }

        async fn poll(&self, task_id: &str) -> Result<PollStatus<Vec<VisionLocator>>, HealError> {
            assert_eq!(task_id, "task-1");
            let mut polls = self.polls.lock();
            *polls += 1;
            match *polls {
                1 => Err(HealError::transient("gateway")),
                2 => Ok(PollStatus::Pending),
                _ => Ok(PollStatus::Completed(vec![
                    VisionLocator {
                        locator: "css=#login".into(),
                        confidence: 0.9,
                    },
                    VisionLocator {
                        locator: "Log In".into(),
                        confidence: 0.8,
                    },
                ])),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fast_path_retries_polls_and_drops_untyped_hits() {
        let vision = Arc::new(Vision {
            polls: Mutex::new(0),
        });
        let producer = FastPathProducer::new(vision.clone());
        let candidates = run(&producer, &request("id=login-btn")).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].locator, "css=#login");
        assert_eq!(candidates[0].source, CandidateSource::FastPath);
        assert_eq!(*vision.polls.lock(), 3);
    }

    #[tokio::test]
    async fn structural_needs_documents() {
        let producer = StructuralProducer::new(StructuralFallbackSearch::default());
        assert!(run(&producer, &request("id=save")).await.is_empty());

        let with_docs = request("id=save").with_documents(
            r#"<body><button id="save">Save</button><a href="/">Home</a></body>"#,
            r#"<body><button id="save-2">Save</button><a href="/">Home</a></body>"#,
        );
        let candidates = run(&producer, &with_docs).await;
        assert_eq!(candidates[0].locator, "id=save-2");
        assert!(candidates
            .iter()
            .all(|c| c.source == CandidateSource::Structural && c.confidence <= 1.0));
    }

    #[tokio::test]
    async fn structural_search_stops_waiting_on_cancel() {
        let producer = StructuralProducer::new(StructuralFallbackSearch::default());
        let request = request("id=save").with_documents(
            r#"<body><button id="save">Save</button></body>"#,
            r#"<body><button id="save-2">Save</button></body>"#,
        );
        let analysis = FailureAnalysis::analyze(&request.failure, None);
        let retry = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(10));
        let poll = PollPolicy::new(Duration::from_secs(1), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ProducerContext {
            request: &request,
            analysis: &analysis,
            retry: &retry,
            poll: &poll,
            cancel: &cancel,
            metrics: None,
            structural_top_k: 3,
        };
        assert_eq!(producer.produce(&ctx).await.unwrap_err(), HealError::Cancelled);
    }

    struct Generator;

    #[async_trait]
    impl GenerativeProducer for Generator {
        async fn generate(
            &self,
            analysis: &FailureAnalysis,
        ) -> Result<Vec<GeneratedLocator>, HealError> {
            assert!(analysis.tokens.contains(&"login".to_string()));
            Ok(vec![
                GeneratedLocator {
                    locator: "xpath=//button[@type='submit']".into(),
                    strategy: StrategyKind::XPath,
                    confidence: 0.75,
                    stability_score: 0.6,
                    reasoning: "submit button in login form".into(),
                },
                GeneratedLocator {
                    locator: "login-submit".into(),
                    strategy: StrategyKind::Id,
                    confidence: 0.65,
                    stability_score: 0.9,
                    reasoning: String::new(),
                },
                GeneratedLocator {
                    locator: "  ".into(),
                    strategy: StrategyKind::Css,
                    confidence: 0.9,
                    stability_score: 0.9,
                    reasoning: String::new(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn generative_records_become_candidates() {
        let producer = GenerativeStage::new(Arc::new(Generator));
        let candidates = run(&producer, &request("id=login-btn")).await;
        let locators: Vec<&str> = candidates.iter().map(|c| c.locator.as_str()).collect();
        assert_eq!(
            locators,
            vec!["xpath=//button[@type='submit']", "id=login-submit"]
        );
        assert_eq!(candidates[0].stability_score, 0.6);
        assert_eq!(
            candidates[0].reasoning.as_deref(),
            Some("submit button in login form")
        );
        assert_eq!(candidates[1].reasoning, None);
    }

    #[tokio::test]
    async fn rules_follow_the_original_locator() {
        let candidates = run(&RulePatternProducer, &request("id=login-btn")).await;
        assert_eq!(candidates[0].locator, "css=#login-btn");
    }
}
