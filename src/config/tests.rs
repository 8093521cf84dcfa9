// 配置系统测试

use crate::config::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.plugins.directory, "plugins/dll");
    assert_eq!(config.plugins.extensions, vec!["dll", "so", "dylib"]);
    assert_eq!(config.plugins.api_version, data_fetch_abi::CONNECTOR_API_VERSION);
    assert!(config.plugins.load_on_startup);
    assert!(!config.plugins.allow_external_paths);
    assert!(config.server.cors_origins.is_empty());
}

#[test]
fn test_default_config_is_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_invalid_config_collects_all_errors() {
    let mut config = AppConfig::default();
    config.server.port = 0;
    config.plugins.extensions.clear();
    config.logging.format = "xml".to_string();

    let errors = ConfigValidator::validate_all(&config).unwrap_err();
    assert_eq!(errors.len(), 3);

    let error = config.validate().unwrap_err();
    assert_eq!(error.error_code(), "CONFIGURATION_ERROR");
    assert!(error.to_string().contains("xml"));
}

#[test]
fn test_config_validator_plugins() {
    let mut plugins = PluginsConfig::default();
    assert!(ConfigValidator::validate_plugins(&plugins).is_ok());

    plugins.directory = "  ".to_string();
    assert!(ConfigValidator::validate_plugins(&plugins).is_err());

    plugins.directory = "plugins".to_string();
    plugins.api_version = 0;
    assert!(ConfigValidator::validate_plugins(&plugins).is_err());

    plugins.api_version = 1;
    plugins.extensions = vec!["so".to_string(), String::new()];
    assert!(ConfigValidator::validate_plugins(&plugins).is_err());
}

#[test]
fn test_config_validator_logging() {
    let mut logging = AppConfig::default().logging;
    assert!(ConfigValidator::validate_logging(&logging).is_ok());

    logging.level = "verbose".to_string();
    assert!(ConfigValidator::validate_logging(&logging).is_err());

    logging.level = "DEBUG".to_string();
    logging.file_enabled = true;
    assert!(ConfigValidator::validate_logging(&logging).is_err());

    logging.file_path = Some("logs/data-fetch.log".to_string());
    assert!(ConfigValidator::validate_logging(&logging).is_ok());
}

#[test]
fn test_config_validator_environment() {
    let mut environment = AppConfig::default().environment;
    environment.name = "qa".to_string();
    assert!(ConfigValidator::validate_environment(&environment).is_err());

    environment.name = "staging".to_string();
    assert!(ConfigValidator::validate_environment(&environment).is_ok());
}

#[test]
fn test_environment_methods() {
    let mut config = AppConfig::default();
    assert!(config.is_development());

    config.environment.name = "production".to_string();
    assert!(config.is_production());
    assert!(!config.is_test());
}

#[test]
fn test_load_from_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
port = 9090

[plugins]
directory = "/opt/connectors"
load_on_startup = false
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.plugins.directory, "/opt/connectors");
    assert!(!config.plugins.load_on_startup);
    assert_eq!(config.plugins.max_plugin_size_mb, 100);
}

#[test]
fn test_load_from_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = AppConfig::load_from(&temp_dir.path().join("missing.toml")).unwrap();
    assert_eq!(config.plugins.directory_path(), std::path::PathBuf::from("plugins/dll"));
    assert!(config.server.cors_origins.is_empty());
    assert!(!config.plugins.allow_external_paths);
}

#[test]
fn test_load_cors_origins_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
cors_origins = ["http://localhost:3000"]

[plugins]
allow_external_paths = true
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.server.cors_origins, vec!["http://localhost:3000"]);
    assert!(config.plugins.allow_external_paths);
}
