//! Tests for configuration loading.

use super::*;
use tempfile::tempdir;

const MINIMAL_YAML: &str = r#"
profiles:
  default:
    driver:
      command: my-agent
"#;

#[test]
fn test_embedded_default_config_is_valid() {
    let config = OrchestratorConfig::default_config().expect("default config");
    assert_eq!(config.max_review_passes, 3);
    assert_eq!(config.default_pipeline_for("default"), Some("implementation"));
    assert_eq!(config.default_pipeline_for("review-only"), Some("review"));
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config: OrchestratorConfig = serde_yaml::from_str(MINIMAL_YAML).expect("parse");
    config.validate().expect("valid");

    let settings = config.settings();
    assert_eq!(settings.max_review_passes, 3);
    assert_eq!(settings.driver_timeout, Duration::from_secs(1800));
    assert_eq!(settings.cancel_grace, Duration::from_secs(10));
    assert_eq!(settings.event_channel_capacity, 256);
    assert!(config.profiles["default"].driver.args.is_empty());
}

#[test]
fn test_validation_errors() {
    let mut config: OrchestratorConfig = serde_yaml::from_str(MINIMAL_YAML).expect("parse");

    config.max_review_passes = 0;
    assert_eq!(
        config.validate(),
        Err(ConfigError::Zero {
            field: "max_review_passes"
        })
    );
    config.max_review_passes = 2;

    config.default_profile = "missing".into();
    assert_eq!(
        config.validate(),
        Err(ConfigError::UnknownDefaultProfile("missing".into()))
    );
    config.default_profile = "default".into();

    if let Some(profile) = config.profiles.get_mut("default") {
        profile.default_pipeline = Some("deploy".into());
    }
    assert!(matches!(
        config.validate(),
        Err(ConfigError::UnknownPipeline { .. })
    ));

    if let Some(profile) = config.profiles.get_mut("default") {
        profile.default_pipeline = None;
        profile.driver.command = "  ".into();
    }
    assert_eq!(
        config.validate(),
        Err(ConfigError::EmptyCommand("default".into()))
    );
}

#[test]
fn test_load_or_default_reads_file_when_present() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("orchestrator.yaml");

    let fallback = OrchestratorConfig::load_or_default(&path).expect("fallback");
    assert!(fallback.profiles.contains_key("review-only"));

    std::fs::write(&path, MINIMAL_YAML).expect("write");
    let loaded = OrchestratorConfig::load_or_default(&path).expect("load");
    assert_eq!(loaded.profiles.len(), 1);
}

#[test]
fn test_load_reports_invalid_file() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("orchestrator.yaml");
    std::fs::write(&path, "profiles: {}\n").expect("write");

    let err = OrchestratorConfig::load(&path).expect_err("no profiles");
    assert!(format!("{err:#}").contains("at least one profile"));
}

#[test]
fn test_driver_factory_resolves_profiles() {
    let config: OrchestratorConfig = serde_yaml::from_str(MINIMAL_YAML).expect("parse");
    let factory = ProfileDriverFactory::from_config(&config);

    assert!(factory.driver_for(&ProfileId::from("default")).is_ok());
    assert!(matches!(
        factory.driver_for(&ProfileId::from("other")),
        Err(OrchestratorError::Configuration(_))
    ));
}
