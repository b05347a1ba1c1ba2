//! Generation cascade: ordered producers with short-circuit thresholds.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use heal_core_types::{CandidateSource, LocatorCandidate};

use crate::policy::HealingPolicy;
use crate::producers::{CandidateProducer, ProducerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CascadeThresholds {
    /// Fast-path results that make every later producer unnecessary.
    pub fast_path: usize,
    /// Cumulative candidates after the structural search that stop the cascade.
    pub structural: usize,
    /// Rules only run while fewer candidates than this exist.
    pub rule_floor: usize,
}

impl Default for CascadeThresholds {
    fn default() -> Self {
        Self {
            fast_path: 3,
            structural: 2,
            rule_floor: 2,
        }
    }
}

impl From<&HealingPolicy> for CascadeThresholds {
    fn from(policy: &HealingPolicy) -> Self {
        Self {
            fast_path: policy.fast_path_short_circuit,
            structural: policy.structural_short_circuit,
            rule_floor: policy.rule_based_floor,
        }
    }
}

/// Result of one producer call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProducerRun {
    Produced { source: CandidateSource, count: usize },
    Failed { source: CandidateSource, reason: String },
}

impl ProducerRun {
    pub fn source(&self) -> CandidateSource {
        match self {
            ProducerRun::Produced { source, .. } | ProducerRun::Failed { source, .. } => *source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
    /// Deduplicated, ranked and truncated alternatives.
    pub candidates: Vec<LocatorCandidate>,
    pub runs: Vec<ProducerRun>,
}

impl CascadeReport {
    pub fn invoked(&self, source: CandidateSource) -> bool {
        self.runs.iter().any(|run| run.source() == source)
    }
}

pub struct Cascade {
    fast_path: Option<Arc<dyn CandidateProducer>>,
    structural: Option<Arc<dyn CandidateProducer>>,
    generative: Option<Arc<dyn CandidateProducer>>,
    rules: Option<Arc<dyn CandidateProducer>>,
    thresholds: CascadeThresholds,
    max_alternatives: usize,
}

impl Cascade {
    pub fn new(thresholds: CascadeThresholds, max_alternatives: usize) -> Self {
        Self {
            fast_path: None,
            structural: None,
            generative: None,
            rules: None,
            thresholds,
            max_alternatives,
        }
    }

    pub fn with_fast_path(mut self, producer: Arc<dyn CandidateProducer>) -> Self {
        self.fast_path = Some(producer);
        self
    }

    pub fn with_structural(mut self, producer: Arc<dyn CandidateProducer>) -> Self {
        self.structural = Some(producer);
        self
    }

    pub fn with_generative(mut self, producer: Arc<dyn CandidateProducer>) -> Self {
        self.generative = Some(producer);
        self
    }

    pub fn with_rules(mut self, producer: Arc<dyn CandidateProducer>) -> Self {
        self.rules = Some(producer);
        self
    }

    /// Run the producers in order until enough candidates exist. Producer
    /// failures count as empty output; they never abort the cascade.
    pub async fn run(&self, ctx: &ProducerContext<'_>) -> CascadeReport {
        let original = ctx.request.failure.original_locator.as_str();
        let mut collected: Vec<LocatorCandidate> = Vec::new();
        let mut runs = Vec::new();

        let stages: [(Option<&Arc<dyn CandidateProducer>>, Stage); 4] = [
            (self.fast_path.as_ref(), Stage::FastPath),
            (self.structural.as_ref(), Stage::Structural),
            (self.generative.as_ref(), Stage::Generative),
            (self.rules.as_ref(), Stage::Rules),
        ];
        for (producer, stage) in stages {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let distinct = distinct_count(&collected, original);
            if stage == Stage::Rules && distinct >= self.thresholds.rule_floor {
                debug!(target: "heal-orchestrator", distinct, "rule patterns not needed");
                break;
            }
            let Some(producer) = producer else {
                continue;
            };

            let source = producer.source();
            match producer.produce(ctx).await {
                Ok(candidates) => {
                    if let Some(metrics) = ctx.metrics {
                        metrics.record_producer(source.as_str(), candidates.len());
                    }
                    debug!(
                        target: "heal-orchestrator",
                        producer = source.as_str(),
                        candidates = candidates.len(),
                        "producer finished"
                    );
                    runs.push(ProducerRun::Produced {
                        source,
                        count: candidates.len(),
                    });
                    collected.extend(candidates);
                }
                Err(err) => {
                    if let Some(metrics) = ctx.metrics {
                        metrics.record_producer(source.as_str(), 0);
                    }
                    warn!(
                        target: "heal-orchestrator",
                        producer = source.as_str(),
                        error = %err,
                        "producer failed, continuing cascade"
                    );
                    runs.push(ProducerRun::Failed {
                        source,
                        reason: err.to_string(),
                    });
                }
            }

            let distinct = distinct_count(&collected, original);
            let stop = match stage {
                Stage::FastPath => distinct >= self.thresholds.fast_path,
                Stage::Structural => distinct >= self.thresholds.structural,
                Stage::Generative | Stage::Rules => false,
            };
            if stop {
                info!(
                    target: "heal-orchestrator",
                    producer = source.as_str(),
                    candidates = distinct,
                    "cascade short-circuited"
                );
                break;
            }
        }

        CascadeReport {
            candidates: rank_and_dedup(collected, original, self.max_alternatives),
            runs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FastPath,
    Structural,
    Generative,
    Rules,
}

/// Distinct locators other than the original.
fn distinct_count(candidates: &[LocatorCandidate], original: &str) -> usize {
    candidates
        .iter()
        .map(|candidate| candidate.locator.as_str())
        .filter(|locator| *locator != original)
        .collect::<HashSet<_>>()
        .len()
}

/// Order by descending `(confidence, stability)`, keep the first occurrence
/// of each locator, drop the original, truncate and renumber priorities.
pub fn rank_and_dedup(
    mut candidates: Vec<LocatorCandidate>,
    original: &str,
    max_alternatives: usize,
) -> Vec<LocatorCandidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.stability_score.total_cmp(&a.stability_score))
    });
    let mut seen = HashSet::new();
    let mut ranked: Vec<LocatorCandidate> = candidates
        .into_iter()
        .filter(|candidate| candidate.locator != original)
        .filter(|candidate| seen.insert(candidate.locator.clone()))
        .take(max_alternatives)
        .collect();
    for (index, candidate) in ranked.iter_mut().enumerate() {
        candidate.priority = index as u32 + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FailureAnalysis;
    use crate::model::HealRequest;
    use crate::retry::{PollPolicy, RetryPolicy};
    use async_trait::async_trait;
    use heal_core_types::{FailureContext, FailureType, HealError, StrategyKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Fixed {
        source: CandidateSource,
        output: Result<Vec<LocatorCandidate>, HealError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(source: CandidateSource, locators: &[(&str, f64)]) -> Arc<Self> {
            let output = locators
                .iter()
                .map(|(value, confidence)| {
                    LocatorCandidate::new(StrategyKind::Css, *value, *confidence, source)
                })
                .collect();
            Arc::new(Self {
                source,
                output: Ok(output),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(source: CandidateSource) -> Arc<Self> {
            Arc::new(Self {
                source,
                output: Err(HealError::transient("unreachable")),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CandidateProducer for Fixed {
        fn source(&self) -> CandidateSource {
            self.source
        }

        async fn produce(
            &self,
            _ctx: &ProducerContext<'_>,
        ) -> Result<Vec<LocatorCandidate>, HealError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    async fn run(cascade: &Cascade) -> CascadeReport {
        let request = HealRequest::new(FailureContext::new(
            "tests/a.rs",
            "case",
            "css=#old",
            FailureType::ElementNotFound,
        ));
        let analysis = FailureAnalysis::analyze(&request.failure, None);
        let retry = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_secs(1));
        let poll = PollPolicy::new(Duration::from_millis(1), 1);
        let cancel = CancellationToken::new();
        let ctx = ProducerContext {
            request: &request,
            analysis: &analysis,
            retry: &retry,
            poll: &poll,
            cancel: &cancel,
            metrics: None,
            structural_top_k: 3,
        };
        cascade.run(&ctx).await
    }

    struct Producers {
        fast: Arc<Fixed>,
        structural: Arc<Fixed>,
        generative: Arc<Fixed>,
        rules: Arc<Fixed>,
    }

    impl Producers {
        fn cascade(&self) -> Cascade {
            Cascade::new(CascadeThresholds::default(), 10)
                .with_fast_path(self.fast.clone())
                .with_structural(self.structural.clone())
                .with_generative(self.generative.clone())
                .with_rules(self.rules.clone())
        }

        fn calls(&self) -> [usize; 4] {
            [
                self.fast.calls(),
                self.structural.calls(),
                self.generative.calls(),
                self.rules.calls(),
            ]
        }
    }

    #[tokio::test]
    async fn three_fast_path_candidates_stop_the_cascade() {
        let producers = Producers {
            fast: Fixed::new(
                CandidateSource::FastPath,
                &[(".a", 0.9), (".b", 0.8), (".c", 0.7)],
            ),
            structural: Fixed::new(CandidateSource::Structural, &[(".d", 0.9)]),
            generative: Fixed::new(CandidateSource::Generative, &[(".e", 0.9)]),
            rules: Fixed::new(CandidateSource::RulePattern, &[(".f", 0.5)]),
        };
        let report = run(&producers.cascade()).await;
        assert_eq!(producers.calls(), [1, 0, 0, 0]);
        assert_eq!(report.candidates.len(), 3);
        assert!(!report.invoked(CandidateSource::Structural));
    }

    #[tokio::test]
    async fn structural_threshold_is_cumulative() {
        let producers = Producers {
            fast: Fixed::new(CandidateSource::FastPath, &[(".a", 0.9)]),
            structural: Fixed::new(CandidateSource::Structural, &[(".b", 0.8)]),
            generative: Fixed::new(CandidateSource::Generative, &[(".e", 0.9)]),
            rules: Fixed::new(CandidateSource::RulePattern, &[(".f", 0.5)]),
        };
        run(&producers.cascade()).await;
        assert_eq!(producers.calls(), [1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn rules_run_below_the_floor_and_failures_are_tolerated() {
        let producers = Producers {
            fast: Fixed::failing(CandidateSource::FastPath),
            structural: Fixed::new(CandidateSource::Structural, &[]),
            generative: Fixed::new(CandidateSource::Generative, &[(".g", 0.6)]),
            rules: Fixed::new(CandidateSource::RulePattern, &[(".r", 0.5)]),
        };
        let report = run(&producers.cascade()).await;
        assert_eq!(producers.calls(), [1, 1, 1, 1]);
        assert!(matches!(report.runs[0], ProducerRun::Failed { .. }));
        let locators: Vec<&str> = report.candidates.iter().map(|c| c.locator.as_str()).collect();
        assert_eq!(locators, vec!["css=.g", "css=.r"]);
    }

    #[tokio::test]
    async fn generative_output_reaching_the_floor_skips_rules() {
        let producers = Producers {
            fast: Fixed::new(CandidateSource::FastPath, &[]),
            structural: Fixed::new(CandidateSource::Structural, &[]),
            generative: Fixed::new(CandidateSource::Generative, &[(".g", 0.6), (".h", 0.6)]),
            rules: Fixed::new(CandidateSource::RulePattern, &[(".r", 0.5)]),
        };
        run(&producers.cascade()).await;
        assert_eq!(producers.calls(), [1, 1, 1, 0]);
    }

    #[tokio::test]
    async fn every_producer_empty_gives_no_candidates() {
        let producers = Producers {
            fast: Fixed::new(CandidateSource::FastPath, &[]),
            structural: Fixed::new(CandidateSource::Structural, &[]),
            generative: Fixed::new(CandidateSource::Generative, &[]),
            rules: Fixed::new(CandidateSource::RulePattern, &[]),
        };
        let report = run(&producers.cascade()).await;
        assert!(report.candidates.is_empty());
        assert_eq!(report.runs.len(), 4);
    }

    #[tokio::test]
    async fn original_locator_does_not_count() {
        let producers = Producers {
            fast: Fixed::new(
                CandidateSource::FastPath,
                &[("#old", 0.9), (".a", 0.8), (".a", 0.7)],
            ),
            structural: Fixed::new(CandidateSource::Structural, &[(".b", 0.9)]),
            generative: Fixed::new(CandidateSource::Generative, &[]),
            rules: Fixed::new(CandidateSource::RulePattern, &[]),
        };
        let report = run(&producers.cascade()).await;
        assert_eq!(producers.calls(), [1, 1, 0, 0]);
        let locators: Vec<&str> = report.candidates.iter().map(|c| c.locator.as_str()).collect();
        assert_eq!(locators, vec!["css=.b", "css=.a"]);
    }

    #[test]
    fn dedup_keeps_best_ranked_occurrence() {
        let candidate = |value: &str, confidence: f64, stability: f64| {
            LocatorCandidate::new(StrategyKind::Css, value, confidence, CandidateSource::Generative)
                .with_stability(stability)
        };
        let ranked = rank_and_dedup(
            vec![
                candidate(".x", 0.5, 0.5),
                candidate(".y", 0.9, 0.1),
                candidate(".x", 0.9, 0.8),
                candidate(".z", 0.9, 0.8),
                candidate(".old", 1.0, 1.0),
            ],
            "css=.old",
            2,
        );
        let summary: Vec<(&str, f64, u32)> = ranked
            .iter()
            .map(|c| (c.locator.as_str(), c.confidence, c.priority))
            .collect();
        assert_eq!(summary, vec![("css=.x", 0.9, 1), ("css=.z", 0.9, 2)]);
    }
}
