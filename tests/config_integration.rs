//! Configuration loading from disk, environment overrides and validation.

use meridian::config::{BackendType, ConfigError, LogFormat, MeridianConfig, EXAMPLE_CONFIG};
use meridian::routing::SelectionStrategy;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_example_config_loads_and_validates() {
    let file = write_config(EXAMPLE_CONFIG);
    let config = MeridianConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.backends.len(), 3);
    assert_eq!(config.backends[0].backend_type, BackendType::Ollama);
    assert_eq!(
        config.routing.scenarios.get("medical-diagnosis"),
        Some(&SelectionStrategy::QualityOptimized)
    );
    assert_eq!(config.workflow.cache_ttl_seconds, 3600);
    assert!(config.templates.contains_key("summarize"));
    config.validate().unwrap();
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[routing.retry]
max_attempts = 5

[workflow]
cache_enabled = false
"#,
    );
    let config = MeridianConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.routing.retry.max_attempts, 5);
    assert_eq!(config.routing.retry.initial_delay_ms, 1000);
    assert!(!config.workflow.cache_enabled);
    assert_eq!(config.workflow.default_scenario, "general");
    assert!(config.health_check.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = MeridianConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let file = write_config("[[backends]\nname = ");
    let err = MeridianConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_unknown_strategy_is_rejected_at_parse_time() {
    let file = write_config("[routing.scenarios]\ntriage = \"fastest\"\n");
    assert!(matches!(
        MeridianConfig::load(Some(file.path())),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_env_overrides_apply_over_file() {
    let file = write_config("[logging]\nlevel = \"warn\"\n");
    let env = HashMap::from([
        ("MERIDIAN_LOG_LEVEL", "debug"),
        ("MERIDIAN_LOG_FORMAT", "json"),
        ("MERIDIAN_MAX_ATTEMPTS", "7"),
        ("MERIDIAN_CACHE_TTL", "not-a-number"),
        ("MERIDIAN_HEALTH_CHECK", "false"),
    ]);

    let config = MeridianConfig::load(Some(file.path()))
        .unwrap()
        .with_overrides_from(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.routing.retry.max_attempts, 7);
    assert_eq!(config.workflow.cache_ttl_seconds, 3600);
    assert!(!config.health_check.enabled);
}

#[test]
fn test_validation_names_the_offending_field() {
    let cases = [
        (
            "[[backends]]\nname = \"a\"\nurl = \"ftp://x\"\ntype = \"ollama\"\n",
            "backends[0].url",
        ),
        (
            "[[backends]]\nname = \"a\"\nurl = \"http://x\"\ntype = \"ollama\"\n\
             [[backends]]\nname = \"a\"\nurl = \"http://y\"\ntype = \"ollama\"\n",
            "backends[1].name",
        ),
        ("[routing.retry]\nmax_attempts = 0\n", "routing.retry.max_attempts"),
        (
            "[alerts]\nfailure_rate_warning = 0.5\nfailure_rate_critical = 0.2\n",
            "alerts.failure_rate_warning",
        ),
        (
            "[workflow]\ncache_ttl_seconds = 0\n",
            "workflow.cache_ttl_seconds",
        ),
        (
            "[[backends]]\nname = \"a\"\nurl = \"http://x\"\ntype = \"anthropic\"\ncredential = \"nope\"\n",
            "backends.a.credential",
        ),
    ];

    for (content, expected) in cases {
        let file = write_config(content);
        let config = MeridianConfig::load(Some(file.path())).unwrap();
        match config.validate() {
            Err(ConfigError::Validation { field, .. }) => assert_eq!(field, expected, "{content}"),
            other => panic!("expected validation error for {expected}, got {other:?}"),
        }
    }
}
