//! Wire events exchanged with clients.
//!
//! Each WebSocket text frame carries one JSON object tagged by `event`:
//!
//! | Direction | `event`          | Payload                         |
//! |-----------|------------------|---------------------------------|
//! | in        | `run_code`       | `language`, `code`              |
//! | in        | `input`          | `text`                          |
//! | out       | `output`         | `text`                          |
//! | out       | `stderr`         | `text`                          |
//! | out       | `error`          | `text`                          |
//! | out       | `compile_error`  | `text`                          |
//! | out       | `input_request`  | (none)                          |
//! | out       | `finished`       | `code`, `signal`, `message`     |

use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

/// Events sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Compile (if needed) and run `code`.
    RunCode {
        /// Requested language name.
        language: String,
        /// Program source text.
        code: String,
    },
    /// One line of console input for the running program.
    Input {
        /// Line text without terminator.
        text: String,
    },
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitIndicator {
    /// Exit code for a normal exit.
    pub code: Option<i32>,
    /// Terminating signal number (Unix only).
    pub signal: Option<i32>,
    /// Human-readable summary.
    pub message: String,
}

impl ExitIndicator {
    /// Build an indicator from a normal exit code.
    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
            message: format!("process exited with code {code}"),
        }
    }

    /// Build an indicator for a process terminated by `signal`.
    #[must_use]
    pub fn signalled(signal: Option<i32>) -> Self {
        let message = signal.map_or_else(
            || "process terminated by signal".to_owned(),
            |sig| format!("process terminated by signal {sig}"),
        );
        Self {
            code: None,
            signal,
            message,
        }
    }

    /// Whether the process exited normally with code zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitIndicator {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::exited(code);
        }

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self::signalled(signal)
    }
}

/// Events sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chunk of standard output, one trailing newline stripped.
    Output {
        /// Chunk text.
        text: String,
    },
    /// A chunk of standard error.
    Stderr {
        /// Chunk text.
        text: String,
    },
    /// Terminal failure or rejected request.
    Error {
        /// Short description.
        text: String,
    },
    /// The compile step failed; terminal for the run.
    CompileError {
        /// Raw compiler diagnostics.
        text: String,
    },
    /// The program is probably blocked on a console read.
    InputRequest,
    /// The program ended.
    Finished(ExitIndicator),
}

impl ServerEvent {
    /// Shorthand for [`ServerEvent::Output`].
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output { text: text.into() }
    }

    /// Shorthand for [`ServerEvent::Error`].
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    /// Whether no further events follow for the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::CompileError { .. } | Self::Finished(_)
        )
    }
}
