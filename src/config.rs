//! Layered configuration: builtin defaults, YAML files, then environment.
//!
//! Environment keys use `LOCATOR_HEAL__<SECTION>__<KEY>` with double
//! underscores separating path segments, e.g.
//! `LOCATOR_HEAL__HEALING__CONFIDENCE_THRESHOLD=0.8`. A JSON document in
//! `LOCATOR_HEAL_OVERRIDE_JSON` is applied last. Every applied value records
//! where it came from.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use element_similarity::{SimilarityConfig, SimilarityScorer};
use heal_orchestrator::{HealingOrchestrator, HealingPolicy, OrchestratorBuilder};

use crate::errors::{ConfigError, LocatorHealError};
use crate::telemetry::LoggingConfig;

pub const ENV_PREFIX: &str = "LOCATOR_HEAL__";
pub const ENV_JSON: &str = "LOCATOR_HEAL_OVERRIDE_JSON";

/// Sections whose keys are open-ended rather than fixed fields.
const OPEN_MAPS: &[&str] = &["similarity.weights", "similarity.metrics"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    pub healing: HealingPolicy,
    pub similarity: SimilarityConfig,
    pub logging: LoggingConfig,
}

impl HealConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.healing
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.scorer()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                path: "logging.level".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn scorer(&self) -> Result<SimilarityScorer, element_similarity::ScorerError> {
        SimilarityScorer::from_config(&self.similarity)
    }

    /// Builder preloaded with this configuration's policy and scorer; ports
    /// are left to the caller.
    pub fn orchestrator_builder(&self) -> Result<OrchestratorBuilder, LocatorHealError> {
        Ok(HealingOrchestrator::builder()
            .policy(self.healing.clone())
            .similarity(self.scorer()?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Builtin,
    File,
    Env,
}

#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: HealConfig,
    /// Dotted path of every leaf value and the layer that last set it.
    pub provenance: BTreeMap<String, ConfigSource>,
}

impl LoadedConfig {
    pub fn source(&self, path: &str) -> Option<ConfigSource> {
        self.provenance.get(path).copied()
    }
}

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

/// Defaults, then `path` when it exists, then the process environment.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let mut options = LoadOptions {
        include_env: true,
        ..LoadOptions::default()
    };
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    load_config_with_options(&options)
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<LoadedConfig, ConfigError> {
    load_config_from_vars(options, env::vars())
}

/// Same as [`load_config_with_options`] with an explicit variable set in
/// place of the process environment.
pub fn load_config_from_vars<I>(options: &LoadOptions, vars: I) -> Result<LoadedConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut tree = serde_json::to_value(HealConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let mut provenance = BTreeMap::new();
    for overlay in flatten_value(tree.clone(), None, ConfigSource::Builtin) {
        provenance.insert(overlay.path, overlay.source);
    }

    for path in &options.paths {
        if path.exists() {
            let overlays = overlays_from_file(path)?;
            debug!(target: "locator-heal", path = %path.display(), values = overlays.len(), "config file applied");
            apply_overlays(&mut tree, &mut provenance, overlays)?;
        }
    }

    if options.include_env {
        let overlays = overlays_from_vars(vars)?;
        apply_overlays(&mut tree, &mut provenance, overlays)?;
    }

    let config: HealConfig =
        serde_json::from_value(tree).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    config.validate()?;
    Ok(LoadedConfig { config, provenance })
}

struct ConfigOverlay {
    path: String,
    value: Value,
    source: ConfigSource,
}

fn apply_overlays(
    tree: &mut Value,
    provenance: &mut BTreeMap<String, ConfigSource>,
    overlays: Vec<ConfigOverlay>,
) -> Result<(), ConfigError> {
    for overlay in overlays {
        set_path(tree, &overlay.path, overlay.value)?;
        provenance.insert(overlay.path, overlay.source);
    }
    Ok(())
}

fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let unsupported = || ConfigError::UnsupportedPath(path.to_string());
    let (parent_path, leaf) = path.rsplit_once('.').ok_or_else(unsupported)?;

    let mut node = tree;
    for segment in parent_path.split('.') {
        node = node
            .as_object_mut()
            .and_then(|map| map.get_mut(segment))
            .ok_or_else(unsupported)?;
    }
    let map: &mut Map<String, Value> = node.as_object_mut().ok_or_else(unsupported)?;

    match map.get(leaf) {
        Some(existing) if !same_kind(existing, &value) => Err(ConfigError::InvalidValue {
            path: path.to_string(),
            message: format!("expected {}, got {}", kind_name(existing), kind_name(&value)),
        }),
        Some(_) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        None if OPEN_MAPS.contains(&parent_path) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        None => Err(unsupported()),
    }
}

fn same_kind(existing: &Value, incoming: &Value) -> bool {
    matches!(
        (existing, incoming),
        (Value::Null, _)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn overlays_from_file(path: &Path) -> Result<Vec<ConfigOverlay>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(format!("{}", err)))?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    Ok(flatten_value(json_value, None, ConfigSource::File))
}

fn overlays_from_vars<I>(vars: I) -> Result<Vec<ConfigOverlay>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overlays = Vec::new();
    let mut override_json = None;
    for (key, raw) in vars {
        if key == ENV_JSON {
            override_json = Some(raw);
            continue;
        }
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(ConfigOverlay {
                path,
                value: parse_env_value(&raw),
                source: ConfigSource::Env,
            });
        }
    }

    if let Some(raw_json) = override_json {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| ConfigError::Invalid(format!("{ENV_JSON}: {err}")))?;
            overlays.extend(flatten_value(json_value, None, ConfigSource::Env));
        }
    }
    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>, source: ConfigSource) -> Vec<ConfigOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix), source));
            }
            result
        }
        other => match prefix {
            Some(path) => vec![ConfigOverlay {
                path,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}
