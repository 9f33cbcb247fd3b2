//! Global configuration parsing and validation.
//!
//! Every field carries a default so the server starts without a config
//! file; a TOML file passed via `--config` overrides individual values.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Prompt detector timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DetectorConfig {
    /// Output silence before an unrecognised chunk is treated as a prompt.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Debounce after a chunk that matched a prompt pattern.
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
}

fn default_idle_timeout_ms() -> u64 {
    300
}

fn default_confirm_delay_ms() -> u64 {
    100
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            confirm_delay_ms: default_confirm_delay_ms(),
        }
    }
}

impl DetectorConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Confirmation debounce as a [`Duration`].
    #[must_use]
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }
}

/// Toolchain binaries used by the built-in language runner.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ToolchainConfig {
    /// C compiler.
    #[serde(default = "default_c_compiler")]
    pub c_compiler: String,
    /// C++ compiler.
    #[serde(default = "default_cpp_compiler")]
    pub cpp_compiler: String,
    /// Java compiler.
    #[serde(default = "default_javac")]
    pub javac: String,
    /// Java launcher.
    #[serde(default = "default_java")]
    pub java: String,
    /// JavaScript interpreter.
    #[serde(default = "default_node")]
    pub node: String,
}

fn default_c_compiler() -> String {
    "gcc".into()
}

fn default_cpp_compiler() -> String {
    "g++".into()
}

fn default_javac() -> String {
    "javac".into()
}

fn default_java() -> String {
    "java".into()
}

fn default_node() -> String {
    "node".into()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            c_compiler: default_c_compiler(),
            cpp_compiler: default_cpp_compiler(),
            javac: default_javac(),
            java: default_java(),
            node: default_node(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    5000
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Address the HTTP/WebSocket listener binds to.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Port the HTTP/WebSocket listener binds to.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Shared directory holding every run's source and build artifacts.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Prompt detector timing.
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Compiler and interpreter binaries.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            temp_dir: default_temp_dir(),
            detector: DetectorConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.http_port)
    }

    /// Create the shared temp directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn ensure_temp_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.temp_dir).map_err(|err| {
            AppError::Io(format!(
                "cannot create temp dir {}: {err}",
                self.temp_dir.display()
            ))
        })
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.detector.idle_timeout_ms == 0 {
            return Err(AppError::Config(
                "detector.idle_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.detector.confirm_delay_ms == 0 {
            return Err(AppError::Config(
                "detector.confirm_delay_ms must be greater than zero".into(),
            ));
        }

        let toolchain = [
            ("c_compiler", &self.toolchain.c_compiler),
            ("cpp_compiler", &self.toolchain.cpp_compiler),
            ("javac", &self.toolchain.javac),
            ("java", &self.toolchain.java),
            ("node", &self.toolchain.node),
        ];
        if let Some((name, _)) = toolchain.iter().find(|(_, bin)| bin.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "toolchain.{name} must not be empty"
            )));
        }

        if self.temp_dir.as_os_str().is_empty() {
            return Err(AppError::Config("temp_dir must not be empty".into()));
        }

        Ok(())
    }
}
