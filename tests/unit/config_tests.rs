//! Unit tests for configuration parsing and validation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use code_relay::config::GlobalConfig;
use code_relay::AppError;

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.http_port, 5000);
    assert_eq!(config.temp_dir, PathBuf::from("temp"));
    assert_eq!(config.detector.idle_timeout(), Duration::from_millis(300));
    assert_eq!(config.detector.confirm_delay(), Duration::from_millis(100));
    assert_eq!(config.toolchain.c_compiler, "gcc");
    assert_eq!(config.toolchain.node, "node");
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let toml = r#"
http_port = 8080
host = "0.0.0.0"

[detector]
idle_timeout_ms = 500

[toolchain]
cpp_compiler = "clang++"
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("valid config");
    assert_eq!(
        config.bind_addr(),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
    );
    assert_eq!(config.detector.idle_timeout_ms, 500);
    assert_eq!(config.detector.confirm_delay_ms, 100);
    assert_eq!(config.toolchain.cpp_compiler, "clang++");
    assert_eq!(config.toolchain.c_compiler, "gcc");
}

#[test]
fn zero_idle_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str("[detector]\nidle_timeout_ms = 0\n").unwrap_err();
    assert!(
        matches!(err, AppError::Config(ref msg) if msg.contains("idle_timeout_ms")),
        "unexpected error: {err}"
    );
}

#[test]
fn zero_confirm_delay_is_rejected() {
    let err = GlobalConfig::from_toml_str("[detector]\nconfirm_delay_ms = 0\n").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("confirm_delay_ms")));
}

#[test]
fn blank_toolchain_binary_is_rejected() {
    let err = GlobalConfig::from_toml_str("[toolchain]\njavac = \"  \"\n").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("toolchain.javac")));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("http_port = \"not a number\"").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "http_port = 6000\n").expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.http_port, 6000);
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn ensure_temp_dir_creates_nested_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig {
        temp_dir: dir.path().join("a").join("b"),
        ..GlobalConfig::default()
    };
    config.ensure_temp_dir().expect("create");
    assert!(config.temp_dir.is_dir());
    // Idempotent.
    config.ensure_temp_dir().expect("second call");
}
