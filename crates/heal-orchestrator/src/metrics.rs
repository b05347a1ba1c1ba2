use prometheus::core::Collector;
use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry};
use tracing::error;

use crate::model::HealingStatus;

/// Healing counters, registered on a caller-supplied registry.
#[derive(Clone)]
pub struct HealMetrics {
    pub sessions_started: IntCounter,
    pub sessions_succeeded: IntCounter,
    pub sessions_failed: IntCounter,
    pub sessions_timed_out: IntCounter,
    pub sessions_cancelled: IntCounter,
    pub producer_calls: IntCounterVec,
    pub producer_candidates: IntCounterVec,
    pub producer_retries: IntCounterVec,
    pub validation_attempts: IntCounter,
    pub session_duration: Histogram,
}

impl HealMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            sessions_started: IntCounter::new(
                "locator_heal_sessions_started_total",
                "Healing sessions that began running",
            )?,
            sessions_succeeded: IntCounter::new(
                "locator_heal_sessions_succeeded_total",
                "Healing sessions that produced a locator",
            )?,
            sessions_failed: IntCounter::new(
                "locator_heal_sessions_failed_total",
                "Healing sessions that failed",
            )?,
            sessions_timed_out: IntCounter::new(
                "locator_heal_sessions_timed_out_total",
                "Healing sessions that hit the session timeout",
            )?,
            sessions_cancelled: IntCounter::new(
                "locator_heal_sessions_cancelled_total",
                "Healing sessions cancelled by the caller",
            )?,
            producer_calls: IntCounterVec::new(
                opts!(
                    "locator_heal_producer_calls_total",
                    "Candidate producer invocations grouped by producer"
                ),
                &["producer"],
            )?,
            producer_candidates: IntCounterVec::new(
                opts!(
                    "locator_heal_producer_candidates_total",
                    "Candidates returned grouped by producer"
                ),
                &["producer"],
            )?,
            producer_retries: IntCounterVec::new(
                opts!(
                    "locator_heal_producer_retries_total",
                    "Retried collaborator calls grouped by producer"
                ),
                &["producer"],
            )?,
            validation_attempts: IntCounter::new(
                "locator_heal_validation_attempts_total",
                "Candidate locators checked against a live session",
            )?,
            session_duration: Histogram::with_opts(histogram_opts!(
                "locator_heal_session_duration_seconds",
                "Wall time of finished healing sessions",
                vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
            ))?,
        })
    }

    /// Register every collector. Already-registered collectors are skipped.
    pub fn register(&self, registry: &Registry) {
        register(registry, self.sessions_started.clone());
        register(registry, self.sessions_succeeded.clone());
        register(registry, self.sessions_failed.clone());
        register(registry, self.sessions_timed_out.clone());
        register(registry, self.sessions_cancelled.clone());
        register(registry, self.producer_calls.clone());
        register(registry, self.producer_candidates.clone());
        register(registry, self.producer_retries.clone());
        register(registry, self.validation_attempts.clone());
        register(registry, self.session_duration.clone());
    }

    pub fn record_producer(&self, producer: &str, candidates: usize) {
        self.producer_calls.with_label_values(&[producer]).inc();
        self.producer_candidates
            .with_label_values(&[producer])
            .inc_by(candidates as u64);
    }

    pub fn record_retry(&self, producer: &str) {
        self.producer_retries.with_label_values(&[producer]).inc();
    }

    pub fn record_finished(&self, status: HealingStatus, seconds: f64) {
        match status {
            HealingStatus::Success => self.sessions_succeeded.inc(),
            HealingStatus::Failed => self.sessions_failed.inc(),
            HealingStatus::Timeout => self.sessions_timed_out.inc(),
            HealingStatus::Pending | HealingStatus::InProgress => return,
        }
        self.session_duration.observe(seconds);
    }
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector)) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(target: "heal-orchestrator", ?err, "failed to register healing metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_registry() {
        let registry = Registry::new();
        let metrics = HealMetrics::new().unwrap();
        metrics.register(&registry);
        metrics.register(&registry);

        metrics.sessions_started.inc();
        metrics.record_producer("structural", 3);
        metrics.record_finished(HealingStatus::Success, 1.5);
        metrics.record_finished(HealingStatus::InProgress, 1.0);

        assert_eq!(metrics.sessions_succeeded.get(), 1);
        assert_eq!(
            metrics
                .producer_candidates
                .with_label_values(&["structural"])
                .get(),
            3
        );
        assert_eq!(metrics.session_duration.get_sample_count(), 1);
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"locator_heal_sessions_started_total".to_string()));
    }
}
