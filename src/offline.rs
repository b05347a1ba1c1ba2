//! Healing against saved page sources, without a browser.

use std::sync::Arc;

use tracing::info;

use dom_snapshot::Document;
use heal_orchestrator::{CodeUpdater, HealMetrics, HealRequest, HealingSession};

use crate::config::HealConfig;
use crate::errors::LocatorHealError;

#[derive(Default, Clone)]
pub struct OfflineOptions {
    /// When absent the update phase is skipped.
    pub updater: Option<Arc<dyn CodeUpdater>>,
    pub metrics: Option<Arc<HealMetrics>>,
}

/// Run one session with the structural and rule producers, validating
/// candidates against the request's current document.
pub async fn heal_offline(
    config: &HealConfig,
    request: HealRequest,
    options: OfflineOptions,
) -> Result<HealingSession, LocatorHealError> {
    if let Some(documents) = &request.documents {
        Document::load(&documents.old)?;
        Document::load(&documents.current)?;
    }

    let mut builder = config.orchestrator_builder()?;
    let mut policy = config.healing.clone();
    match options.updater {
        Some(updater) => builder = builder.code_updater(updater),
        None => policy.auto_update = false,
    }
    if let Some(metrics) = options.metrics {
        builder = builder.metrics(metrics);
    }
    let orchestrator = builder.policy(policy).build()?;

    info!(
        target: "locator-heal",
        locator = %request.failure.original_locator,
        test_file = %request.failure.test_file,
        "offline healing"
    );
    Ok(orchestrator.heal(request).await?)
}
