//! Unit tests for TOML configuration loading
//!
//! - Missing config file falls back to defaults
//! - Partial files fill in compiled defaults
//! - Malformed files are configuration errors

use banlist_common::config::{
    load_toml_config, parse_toml_config, TomlConfig, DEFAULT_ITEM_DELAY_MS,
    DEFAULT_SESSION_WINDOW_SECS,
};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_no_config_path_uses_defaults() {
    let config = load_toml_config(None).unwrap();
    assert_eq!(config.session_window_secs, DEFAULT_SESSION_WINDOW_SECS);
    assert_eq!(config.item_delay_ms, DEFAULT_ITEM_DELAY_MS);
    assert!(config.webhook_url.is_none());
}

#[test]
fn test_missing_config_file_is_not_fatal() {
    let path = std::path::Path::new("/nonexistent/banlist/config.toml");
    let config = load_toml_config(Some(path)).unwrap();
    assert_eq!(config.listen, TomlConfig::default().listen);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = parse_toml_config(
        r#"
        webhook_url = "https://hooks.example/main"
        session_window_secs = 30

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example/main"));
    assert_eq!(config.session_window(), Duration::from_secs(30));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.item_delay_ms, DEFAULT_ITEM_DELAY_MS);
}

#[test]
fn test_config_file_on_disk() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "digest_interval_secs = 0").unwrap();
    writeln!(file, "batch_dir = \"/srv/imports\"").unwrap();

    let config = load_toml_config(Some(file.path())).unwrap();
    assert!(config.digest_interval().is_none());
    assert_eq!(config.batch_dir.unwrap().to_string_lossy(), "/srv/imports");
}

#[test]
fn test_malformed_file_is_error() {
    assert!(parse_toml_config("session_window_secs = \"soon\"").is_err());
}

#[test]
fn test_validate_rejects_zero_window() {
    let config = TomlConfig {
        session_window_secs: 0,
        ..TomlConfig::default()
    };
    assert!(config.validate().is_err());
    assert!(TomlConfig::default().validate().is_ok());
}
