//! Shared helpers for coordinator and transport integration tests.
//!
//! [`ShellRunner`] stands in for real compilers: every "language" is a
//! `/bin/sh` recipe, so the tests exercise real processes and real files
//! without needing a toolchain installed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use code_relay::config::DetectorConfig;
use code_relay::models::event::ServerEvent;
use code_relay::models::ids::RunId;
use code_relay::orchestrator::{Connection, RunReport, SessionCoordinator};
use code_relay::runner::{CommandSpec, Language, LanguageRunner, RunPlan, SourceTransform};
use code_relay::{AppError, Result};

/// How long any single event may take to show up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shell-backed runner.
///
/// | language   | compile                      | run                 |
/// |------------|------------------------------|---------------------|
/// | `sh`       | none                         | `/bin/sh src`       |
/// | `compiled` | `cp src out`                 | `/bin/sh out`       |
/// | `broken`   | prints to stderr, exits 2    | never reached       |
/// | `missing`  | none                         | nonexistent binary  |
/// | `slow`     | sleeps 30 s                  | never reached       |
#[derive(Debug)]
pub struct ShellRunner {
    temp_dir: PathBuf,
}

impl ShellRunner {
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            temp_dir: temp_dir.to_owned(),
        }
    }
}

impl LanguageRunner for ShellRunner {
    fn plan(&self, language: &str, run_id: RunId) -> Result<RunPlan> {
        let source = self.temp_dir.join(format!("run-{run_id}.sh"));
        let binary = self.temp_dir.join(format!("run-{run_id}.out"));

        let (compile, run, resources) = match language {
            "sh" => (
                None,
                CommandSpec::new("/bin/sh", [source.as_os_str()]),
                vec![source.clone()],
            ),
            "compiled" => (
                Some(CommandSpec::new(
                    "/bin/cp",
                    [source.as_os_str(), binary.as_os_str()],
                )),
                CommandSpec::new("/bin/sh", [binary.as_os_str()]),
                vec![source.clone(), binary],
            ),
            "broken" => (
                Some(CommandSpec::new(
                    "/bin/sh",
                    [
                        OsStr::new("-c"),
                        OsStr::new("echo \"error: expected ';'\" >&2; exit 2"),
                    ],
                )),
                CommandSpec::new("/bin/sh", [binary.as_os_str()]),
                vec![source.clone(), binary],
            ),
            "slow" => (
                Some(CommandSpec::new(
                    "/bin/sh",
                    [OsStr::new("-c"), OsStr::new("exec sleep 30")],
                )),
                CommandSpec::new("/bin/sh", [binary.as_os_str()]),
                vec![source.clone(), binary],
            ),
            "missing" => (
                None,
                CommandSpec::new("/nonexistent/interpreter", [source.as_os_str()]),
                vec![source.clone()],
            ),
            other => return Err(AppError::UnsupportedLanguage(other.to_owned())),
        };

        Ok(RunPlan {
            language: Language::JavaScript,
            source_path: source,
            compile,
            run,
            resources,
            transform: SourceTransform::Verbatim,
        })
    }
}

/// A coordinator over a fresh temp directory.
pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_detector(DetectorConfig::default())
    }

    pub fn with_detector(detector: DetectorConfig) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ShellRunner::new(temp.path());
        Self {
            coordinator: SessionCoordinator::new(Arc::new(runner), detector),
            temp,
        }
    }

    /// Open a connection and return its event receiver.
    pub fn connect(&self) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (Connection::new(tx), rx)
    }

    /// Start a run on its own task.
    pub fn start(&self, conn: &Connection, language: &str, code: &str) -> JoinHandle<RunReport> {
        let coordinator = self.coordinator.clone();
        let conn = conn.clone();
        let language = language.to_owned();
        let code = code.to_owned();
        tokio::spawn(async move { coordinator.run_code(&conn, &language, &code).await })
    }

    /// Names of files left in the temp directory.
    pub fn leftover_files(&self) -> Vec<String> {
        std::fs::read_dir(self.temp.path())
            .expect("read temp dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Receive the next event or panic after [`EVENT_TIMEOUT`].
pub async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

/// Collect events up to and including the first terminal one.
pub async fn collect_until_terminal(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Await a run task or panic after [`EVENT_TIMEOUT`].
pub async fn join(task: JoinHandle<RunReport>) -> RunReport {
    tokio::time::timeout(EVENT_TIMEOUT, task)
        .await
        .expect("run ends within timeout")
        .expect("run task did not panic")
}
