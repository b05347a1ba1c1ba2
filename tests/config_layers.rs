use std::io::Write;

use element_similarity::Property;
use locator_heal::{
    load_config, load_config_from_vars, ConfigError, ConfigSource, LoadOptions, ENV_JSON,
};
use serial_test::serial;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn yaml_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn file_then_env_then_json_override() {
    let file = yaml_file(
        r#"
healing:
  confidence_threshold: 0.8
  max_alternatives: 5
similarity:
  lambda: 0.01
  weights:
    visible_text: 3.0
    role: 1.0
logging:
  level: debug
"#,
    );
    let options = LoadOptions::with_path(file.path());
    let loaded = load_config_from_vars(
        &options,
        vars(&[
            ("LOCATOR_HEAL__HEALING__MAX_ALTERNATIVES", "7"),
            ("LOCATOR_HEAL__LOGGING__JSON", "true"),
            (ENV_JSON, r#"{"healing": {"auto_update": false}}"#),
            ("UNRELATED", "1"),
        ]),
    )
    .unwrap();

    let config = &loaded.config;
    assert_eq!(config.healing.confidence_threshold, 0.8);
    assert_eq!(config.healing.max_alternatives, 7);
    assert!(!config.healing.auto_update);
    assert_eq!(config.healing.max_retries, 3);
    assert_eq!(config.similarity.lambda, 0.01);
    assert_eq!(config.similarity.weights.get(&Property::VisibleText), Some(&3.0));
    assert_eq!(config.similarity.weights.get(&Property::Role), Some(&1.0));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);

    assert_eq!(loaded.source("healing.confidence_threshold"), Some(ConfigSource::File));
    assert_eq!(loaded.source("healing.max_alternatives"), Some(ConfigSource::Env));
    assert_eq!(loaded.source("healing.auto_update"), Some(ConfigSource::Env));
    assert_eq!(loaded.source("healing.max_retries"), Some(ConfigSource::Builtin));
    assert_eq!(loaded.source("similarity.weights.role"), Some(ConfigSource::File));

    let scorer = config.scorer().unwrap();
    assert_eq!(scorer.table().weight(Property::VisibleText), 3.0);
}

#[test]
fn missing_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let options = LoadOptions::with_path(dir.path().join("absent.yaml"));
    let loaded = load_config_from_vars(&options, Vec::new()).unwrap();
    assert_eq!(loaded.config, Default::default());
}

#[test]
fn unknown_paths_and_wrong_types_are_rejected() {
    let err = load_config_from_vars(
        &LoadOptions {
            include_env: true,
            ..LoadOptions::default()
        },
        vars(&[("LOCATOR_HEAL__HEALING__MAX_RETRYS", "4")]),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConfigError::UnsupportedPath("healing.max_retrys".into())
    );

    let file = yaml_file("healing:\n  auto_update: sometimes\n");
    let err = load_config_from_vars(&LoadOptions::with_path(file.path()), Vec::new()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref path, .. } if path == "healing.auto_update"));
}

#[test]
fn semantic_validation_runs_after_layering() {
    let file = yaml_file("healing:\n  confidence_threshold: 1.5\n");
    let err = load_config_from_vars(&LoadOptions::with_path(file.path()), Vec::new()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let file = yaml_file("similarity:\n  weights:\n    visible_text: -1.0\n");
    let err = load_config_from_vars(&LoadOptions::with_path(file.path()), Vec::new()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
#[serial]
fn process_environment_is_read() {
    std::env::set_var("LOCATOR_HEAL__HEALING__MAX_CONCURRENT_SESSIONS", "2");
    let loaded = load_config(None);
    std::env::remove_var("LOCATOR_HEAL__HEALING__MAX_CONCURRENT_SESSIONS");

    let loaded = loaded.unwrap();
    assert_eq!(loaded.config.healing.max_concurrent_sessions, 2);
    assert_eq!(
        loaded.source("healing.max_concurrent_sessions"),
        Some(ConfigSource::Env)
    );
}
