//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use ssh_session_hub::cli::{parse_args_from, Args};
use ssh_session_hub::config::{Config, ConfigError};

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("ssh-session-hub")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.host.is_none());
    assert!(result.port.is_none());
    assert!(!result.no_auth);
    assert!(result.config.is_none());
    assert!(result.api_key.is_none());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-H",
        "0.0.0.0",
        "-p",
        "8080",
        "-k",
        "my-api-key",
        "-l",
        "debug",
    ]))
    .unwrap();

    assert_eq!(result.host.unwrap().to_string(), "0.0.0.0");
    assert_eq!(result.port, Some(8080));
    assert_eq!(result.api_key, Some("my-api-key".to_string()));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert!(!result.no_auth);
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/ssh-session-hub.json"])).unwrap();

    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/etc/ssh-session-hub.json"
    );
}

#[test]
fn test_cli_invalid_values() {
    assert!(parse_args_from(args(&["-p", "not-a-number"])).is_err());
    assert!(parse_args_from(args(&["-p", "70000"])).is_err());
    assert!(parse_args_from(args(&["-H", "not-an-ip"])).is_err());
}

#[test]
fn test_cli_missing_value() {
    assert!(parse_args_from(args(&["--port"])).is_err());
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_without_file_uses_defaults() {
    let config = Config::load(&Args::default()).unwrap();

    assert_eq!(config.ssh.default_port, 22);
    assert_eq!(config.shell.default_cols, 80);
    assert_eq!(config.connect_timeout(), Duration::from_secs(30));
}

#[test]
fn test_load_from_file() {
    let file = config_file(
        r#"{
            "server": { "port": 9100, "graceful_shutdown": false },
            "ssh": { "default_port": 2222, "connect_timeout_secs": 5 },
            "shell": { "default_rows": 50, "default_read_timeout_ms": 250 }
        }"#,
    );

    let parsed = parse_args_from(args(&["-c", file.path().to_str().unwrap()])).unwrap();
    let config = Config::load(&parsed).unwrap();

    assert_eq!(config.server.port, 9100);
    assert!(!config.server.graceful_shutdown);

    let defaults = config.api_defaults();
    assert_eq!(defaults.ssh_port, 2222);
    assert_eq!(defaults.rows, 50);
    assert_eq!(defaults.read_timeout, Duration::from_millis(250));
    assert_eq!(defaults.connect_timeout, Some(Duration::from_secs(5)));
}

#[test]
fn test_cli_overrides_file() {
    let file = config_file(
        r#"{
            "server": { "host": "0.0.0.0", "port": 9100 },
            "security": { "auth": { "enabled": true, "api_keys": ["file-key"] } }
        }"#,
    );

    let parsed = parse_args_from(args(&[
        "-c",
        file.path().to_str().unwrap(),
        "-p",
        "9200",
        "-k",
        "cli-key",
    ]))
    .unwrap();
    let config = Config::load(&parsed).unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9200);

    let store = config.api_key_store();
    assert!(store.is_valid("file-key"));
    assert!(store.is_valid("cli-key"));
}

#[test]
fn test_no_auth_overrides_file() {
    let file = config_file(r#"{ "security": { "auth": { "enabled": true, "api_keys": ["k"] } } }"#);

    let parsed =
        parse_args_from(args(&["-c", file.path().to_str().unwrap(), "--no-auth"])).unwrap();
    let config = Config::load(&parsed).unwrap();

    assert!(!config.api_key_store().is_enabled());
}

#[test]
fn test_load_rejects_inverted_typing_window() {
    let file = config_file(r#"{ "shell": { "typing_min_delay_ms": 500, "typing_max_delay_ms": 10 } }"#);

    let parsed = parse_args_from(args(&["-c", file.path().to_str().unwrap()])).unwrap();
    assert!(matches!(
        Config::load(&parsed),
        Err(ConfigError::InvalidTypingWindow { .. })
    ));
}

#[test]
fn test_load_missing_file() {
    let parsed = parse_args_from(args(&["-c", "/nonexistent/ssh-session-hub.json"])).unwrap();
    assert!(matches!(Config::load(&parsed), Err(ConfigError::Io(_))));
}

#[test]
fn test_server_config_from_loaded_config() {
    let parsed = parse_args_from(args(&["-H", "0.0.0.0", "-p", "8088"])).unwrap();
    let config = Config::load(&parsed).unwrap();

    let server = config.to_server_config().unwrap();
    assert_eq!(server.bind_address(), "0.0.0.0:8088");
}
