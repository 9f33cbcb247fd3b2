//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The requested language has no run plan.
    UnsupportedLanguage(String),
    /// The compile step exited non-zero; carries the compiler's stderr.
    Compile(String),
    /// The OS could not start the run command.
    Spawn(String),
    /// A stream of an already-running process failed.
    Runtime(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// The connection already owns a running session.
    AlreadyRunning(String),
    /// WebSocket or HTTP transport failure.
    Transport(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::UnsupportedLanguage(lang) => write!(f, "Unsupported language: {lang}"),
            // Compiler diagnostics are shown to the user verbatim.
            Self::Compile(stderr) => f.write_str(stderr),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Runtime(msg) => write!(f, "runtime: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
