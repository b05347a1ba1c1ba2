//! Self-healing locators for UI test automation.
//!
//! The workspace crates carry the kernel: `dom-snapshot` (documents and
//! queries), `element-similarity` (weighted scoring), `structural-fallback`
//! (replacement search) and `heal-orchestrator` (healing sessions). This
//! crate adds layered configuration, tracing setup and an offline healing
//! entry point.

pub mod config;
pub mod errors;
pub mod offline;
pub mod telemetry;

pub use config::{
    load_config, load_config_from_vars, load_config_with_options, ConfigSource, HealConfig,
    LoadOptions, LoadedConfig, ENV_JSON, ENV_PREFIX,
};
pub use errors::{ConfigError, LocatorHealError};
pub use offline::{heal_offline, OfflineOptions};
pub use telemetry::{init_tracing, LoggingConfig};

pub use dom_snapshot::Document;
pub use element_similarity::{SimilarityConfig, SimilarityScorer};
pub use heal_core_types::{FailureContext, FailureType, HealError, Locator, StrategyKind};
pub use heal_orchestrator::{
    CodeUpdateResult, CodeUpdater, HealMetrics, HealRequest, HealingOrchestrator, HealingPolicy,
    HealingReport, HealingSession, HealingStatus,
};
pub use structural_fallback::StructuralFallbackSearch;
