use super::*;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        model: Some("sonar".to_string()),
        rate_limit: Some(20.0),
        citations: Some(true),
        ..Default::default()
    };
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");
    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    let mut config = loaded;
    config.model = None;
    config
        .save_to_path(&config_path)
        .expect("Failed to save unset config");
    let loaded = Config::load_from_path(&config_path).expect("Failed to load unset config");
    assert_eq!(loaded.model, None);
    assert_eq!(loaded.rate_limit, Some(20.0));
    assert_eq!(loaded.citations, Some(true));
}

#[test]
fn test_parse_error_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "model = [not toml").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn test_config_keys_parse_leniently() {
    assert_eq!("model".parse::<ConfigKey>().unwrap(), ConfigKey::Model);
    assert_eq!(
        "rate_limit".parse::<ConfigKey>().unwrap(),
        ConfigKey::RateLimit
    );
    assert_eq!(" API-URL ".parse::<ConfigKey>().unwrap(), ConfigKey::ApiUrl);
    let err = "colour".parse::<ConfigKey>().unwrap_err();
    assert!(err.to_string().contains("Known keys: api-url, model"));
}

#[test]
fn test_set_value_validates_input() {
    let mut config = Config::default();

    config.set_value(ConfigKey::Model, "sonar-pro").unwrap();
    config.set_value(ConfigKey::Timeout, "45").unwrap();
    config.set_value(ConfigKey::RateLimit, "0").unwrap();
    config.set_value(ConfigKey::Stream, "on").unwrap();
    config.set_value(ConfigKey::Usage, "false").unwrap();
    config
        .set_value(ConfigKey::ApiUrl, "http://localhost:9000/v1")
        .unwrap();
    config
        .set_value(ConfigKey::HistoryPath, "/tmp/history.json")
        .unwrap();

    assert_eq!(config.model.as_deref(), Some("sonar-pro"));
    assert_eq!(config.timeout_secs, Some(45));
    assert_eq!(config.rate_limit, Some(0.0));
    assert_eq!(config.stream, Some(true));
    assert_eq!(config.usage, Some(false));
    assert_eq!(
        config.api_url.as_deref(),
        Some("http://localhost:9000/v1/chat/completions")
    );
    assert_eq!(
        config.history_path,
        Some(PathBuf::from("/tmp/history.json"))
    );

    assert!(config.set_value(ConfigKey::Model, "gpt-4").is_err());
    assert!(config.set_value(ConfigKey::Timeout, "0").is_err());
    assert!(config.set_value(ConfigKey::Timeout, "soon").is_err());
    assert!(config.set_value(ConfigKey::RateLimit, "-3").is_err());
    assert!(config.set_value(ConfigKey::Render, "maybe").is_err());
    assert!(config.set_value(ConfigKey::ApiUrl, "localhost").is_err());
    assert!(config.set_value(ConfigKey::SystemPrompt, "   ").is_err());

    // Failed sets leave the previous value in place.
    assert_eq!(config.model.as_deref(), Some("sonar-pro"));
    assert_eq!(config.timeout_secs, Some(45));
}

#[test]
fn test_unset_and_display() {
    let mut config = Config::default();
    config.set_value(ConfigKey::Render, "yes").unwrap();
    config.set_value(ConfigKey::Timeout, "30").unwrap();
    assert_eq!(config.display_value(ConfigKey::Render), "on");
    assert_eq!(config.display_value(ConfigKey::Timeout), "30s");
    assert_eq!(config.display_value(ConfigKey::Model), "(unset)");

    config.unset_value(ConfigKey::Render);
    assert_eq!(config.render, None);
    assert_eq!(config.display_value(ConfigKey::Render), "(unset)");
}

#[test]
fn test_every_key_round_trips_its_name() {
    for key in ConfigKey::ALL {
        assert_eq!(key.name().parse::<ConfigKey>().unwrap(), key);
    }
}
