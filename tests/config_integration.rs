use mcp_config_sync::config::{AppConfig, LogFormat};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;

const BIN: &str = "mcp-config-sync";

// Clear variables that would leak between tests.
fn clear_env_vars() {
    unsafe {
        env::remove_var("MCP_SYNC_SERVER__PORT");
        env::remove_var("MCP_SYNC_DOCUMENT__SERVERS_KEY");
        env::remove_var("MCP_SYNC_CACHE__TTL_SECS");
        env::remove_var("SETTINGS_FILE");
        env::remove_var("CONFIG_PATH");
        env::remove_var("PORT");
        env::remove_var("TIMEOUT_DISABLED");
        env::remove_var("LOG_FORMAT");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("defaults should load");
    assert_eq!(config.server.port, 3080);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.document.path, PathBuf::from("./config.yaml"));
    assert_eq!(config.document.servers_key, "mcpServers");
    assert_eq!(config.cache.ttl_secs, 300);
    assert_eq!(config.resilience.server_init_timeout_secs, 15);
    assert_eq!(config.log.format, LogFormat::Compact);
    assert!(config.request_timeout().is_some());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("MCP_SYNC_SERVER__PORT", "9090");
        env::set_var("MCP_SYNC_DOCUMENT__SERVERS_KEY", "servers");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.document.servers_key, "servers");

    clear_env_vars();
}

#[test]
#[serial]
fn test_settings_file_load() {
    clear_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("service.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
document:
  path: /srv/librechat.yaml
tools:
  manifest_path: /srv/manifest.json
",
    )
    .unwrap();

    unsafe {
        env::set_var("SETTINGS_FILE", &file_path);
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load settings file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.document.path, PathBuf::from("/srv/librechat.yaml"));
    assert_eq!(config.tools.manifest_path, PathBuf::from("/srv/manifest.json"));
    assert_eq!(config.tools.directory, PathBuf::from("./tools"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env_and_file() {
    clear_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("service.yaml");
    fs::write(&file_path, "document:\n  path: /from/file.yaml\n").unwrap();

    unsafe {
        env::set_var("MCP_SYNC_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        BIN,
        "--settings",
        file_path.to_str().unwrap(),
        "--config-path",
        "/from/cli.yaml",
        "--port",
        "5050",
    ])
    .expect("Failed to load config");
    assert_eq!(config.document.path, PathBuf::from("/from/cli.yaml"));
    assert_eq!(config.server.port, 5050);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_settings_fallback() {
    clear_env_vars();

    let cwd_path = "settings.yaml";
    fs::write(cwd_path, "server:\n  port: 6060\n").expect("Failed to write ./settings.yaml");

    let config = AppConfig::load_from_args([BIN]);

    // Clean up before asserting so a failure does not leave the file behind.
    fs::remove_file(cwd_path).unwrap();

    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}
