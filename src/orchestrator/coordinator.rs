//! Session coordinator: drives one run request end to end.
//!
//! A run goes through these steps, each of which can end it:
//!
//! 1. The language runner builds a plan (unsupported language → `error`).
//! 2. The source is written into the shared temp directory.
//! 3. The optional compile step runs to completion (`compile_error`).
//! 4. The program is spawned (`error`) and registered as the connection's
//!    session.
//! 5. The session driver relays output through the prompt detector,
//!    forwards input, and ends with `finished`, a runtime `error`, or a kill.
//!
//! Resources are released on every one of those paths. Once a session is
//! registered, whichever side removes it from the registry (driver on exit,
//! transport on disconnect, server on shutdown) releases its files, and
//! only after the process has been reaped.

use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cleanup::{self, CleanupReport};
use super::process::{self, ChildProcess, ProcessHandle};
use super::prompt_detector::{strip_trailing_newline, PromptDetector};
use super::registry::{Session, SessionCommand, SessionLink, SessionRegistry};
use crate::config::DetectorConfig;
use crate::models::event::{ClientEvent, ExitIndicator, ServerEvent};
use crate::models::ids::{ConnectionId, RunId};
use crate::runner::{LanguageRunner, RunPlan};
use crate::AppError;

/// Message sent when a connection already has a running program.
pub const ALREADY_RUNNING: &str = "a program is already running";

/// Message sent when the server kills a program while the client is still connected.
pub const KILLED_BY_SERVER: &str = "program terminated by server";

/// Outbound half of a client connection.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// One client connection as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    events: EventSender,
    closed: CancellationToken,
}

impl Connection {
    /// Wrap the outbound event channel of a new connection.
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        Self {
            id: ConnectionId::next(),
            events,
            closed: CancellationToken::new(),
        }
    }

    /// Identity of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the client has disconnected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn emit(&self, event: ServerEvent) {
        if self.events.send(event).await.is_err() {
            debug!(connection_id = %self.id, "client gone, event dropped");
        }
    }
}

/// How a run request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Refused before any side effect (unsupported language, busy connection).
    Rejected,
    /// The compile step failed.
    CompileFailed,
    /// The program could not be started.
    SpawnFailed,
    /// The program exited on its own.
    Finished(ExitIndicator),
    /// I/O failure before or during the run.
    Failed,
    /// Killed because of a disconnect or server shutdown.
    Killed,
}

/// How a run request ended, plus the release performed by the run itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Files this run released. `None` when it created nothing or another
    /// owner (disconnect, shutdown) took the session and released them.
    pub cleanup: Option<CleanupReport>,
}

impl RunReport {
    fn new(outcome: RunOutcome, cleanup: Option<CleanupReport>) -> Self {
        Self { outcome, cleanup }
    }

    fn rejected() -> Self {
        Self::new(RunOutcome::Rejected, None)
    }
}

/// Why a session driver loop stopped.
enum Ending {
    Exited(ExitIndicator),
    Killed,
    Failed(AppError),
}

struct Inner {
    registry: SessionRegistry,
    runner: Arc<dyn LanguageRunner>,
    detector: DetectorConfig,
}

/// Composition root for run requests; cheap to clone.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    /// Create a coordinator with an empty registry.
    #[must_use]
    pub fn new(runner: Arc<dyn LanguageRunner>, detector: DetectorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(),
                runner,
                detector,
            }),
        }
    }

    /// Live sessions.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Route one inbound client event. Run requests proceed on their own task.
    pub fn dispatch(&self, conn: &Connection, event: ClientEvent) {
        match event {
            ClientEvent::RunCode { language, code } => {
                let coordinator = self.clone();
                let conn = conn.clone();
                tokio::spawn(async move {
                    let report = coordinator.run_code(&conn, &language, &code).await;
                    debug!(connection_id = %conn.id(), outcome = ?report.outcome, "run request complete");
                });
            }
            ClientEvent::Input { text } => {
                self.input(conn.id(), text);
            }
        }
    }

    /// Execute one run request for `conn` and wait until it has ended.
    pub async fn run_code(&self, conn: &Connection, language: &str, code: &str) -> RunReport {
        if self.inner.registry.contains(conn.id()) {
            conn.emit(ServerEvent::error(ALREADY_RUNNING)).await;
            return RunReport::rejected();
        }

        let run_id = RunId::new();
        let plan = match self.inner.runner.plan(language, run_id) {
            Ok(plan) => plan,
            Err(err) => {
                info!(connection_id = %conn.id(), language, %err, "run request rejected");
                conn.emit(ServerEvent::error(err.to_string())).await;
                return RunReport::rejected();
            }
        };

        let span = info_span!(
            "run",
            connection_id = %conn.id(),
            %run_id,
            language = %plan.language
        );
        self.execute(conn, run_id, plan, code).instrument(span).await
    }

    /// Forward `text` to the session of `conn`.
    ///
    /// Returns `false` (and does nothing else) when there is no session.
    pub fn input(&self, conn: ConnectionId, text: String) -> bool {
        match self.inner.registry.lookup(conn) {
            Some(session) => session.send_input(text),
            None => {
                debug!(connection_id = %conn, "input without a running program ignored");
                false
            }
        }
    }

    /// Tear down the session of a closed connection, if it has one.
    ///
    /// Returns the release report when this call took the session; `None`
    /// when there was none or its driver had already taken it.
    pub async fn disconnect(&self, conn: &Connection) -> Option<CleanupReport> {
        conn.closed.cancel();
        let session = self.inner.registry.remove(conn.id())?;
        info!(connection_id = %conn.id(), "tearing down session after disconnect");
        Some(teardown(session).await)
    }

    /// Kill every live session and release its files. Returns how many
    /// sessions were torn down.
    pub async fn shutdown(&self) -> usize {
        let sessions = self.inner.registry.drain();
        let count = sessions.len();
        join_all(sessions.into_iter().map(|(_, session)| teardown(session))).await;
        info!(count, "all sessions torn down");
        count
    }

    async fn execute(&self, conn: &Connection, run_id: RunId, plan: RunPlan, code: &str) -> RunReport {
        if let Err(err) = tokio::fs::write(&plan.source_path, plan.render_source(code)).await {
            warn!(%err, path = %plan.source_path.display(), "failed to write source");
            conn.emit(ServerEvent::error(format!("failed to write source: {err}")))
                .await;
            let released = cleanup::release(&plan.resources).await;
            return RunReport::new(RunOutcome::Failed, Some(released));
        }

        if let Some(compile) = &plan.compile {
            let compiled = tokio::select! {
                result = process::run_to_completion(compile) => result,
                () = conn.closed.cancelled() => {
                    info!("connection closed during compile");
                    let released = cleanup::release(&plan.resources).await;
                    return RunReport::new(RunOutcome::Killed, Some(released));
                }
            };
            if let Err(err) = compiled {
                conn.emit(ServerEvent::CompileError {
                    text: err.to_string(),
                })
                .await;
                let released = cleanup::release(&plan.resources).await;
                return RunReport::new(RunOutcome::CompileFailed, Some(released));
            }
        }

        if conn.is_closed() {
            let released = cleanup::release(&plan.resources).await;
            return RunReport::new(RunOutcome::Killed, Some(released));
        }

        let mut handle = match process::spawn(&plan.run) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(%err, "failed to start program");
                conn.emit(ServerEvent::error(err.to_string())).await;
                let released = cleanup::release(&plan.resources).await;
                return RunReport::new(RunOutcome::SpawnFailed, Some(released));
            }
        };

        let (session, link) = Session::new(
            run_id,
            plan.language,
            handle.process.pid(),
            plan.resources.clone(),
            conn.closed.child_token(),
        );
        if let Err(err) = self.inner.registry.register(conn.id(), session) {
            warn!(%err, "second program for connection refused");
            reap(&mut handle.process).await;
            conn.emit(ServerEvent::error(ALREADY_RUNNING)).await;
            let released = cleanup::release(&plan.resources).await;
            return RunReport::new(RunOutcome::Rejected, Some(released));
        }

        info!(pid = handle.process.pid(), "session started");
        self.drive(conn, run_id, handle, link).await
    }

    /// Session driver: the only place a session's process and detector are touched.
    async fn drive(
        &self,
        conn: &Connection,
        run_id: RunId,
        handle: ProcessHandle,
        mut link: SessionLink,
    ) -> RunReport {
        let ProcessHandle {
            mut process,
            mut stdin,
            mut stdout,
            mut stderr,
        } = handle;
        let mut detector = PromptDetector::new(&self.inner.detector, Instant::now());
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit: Option<ExitIndicator> = None;

        let ending = loop {
            // `finished` goes out only after both pipes are drained.
            if !stdout_open && !stderr_open {
                if let Some(exit) = exit.take() {
                    break Ending::Exited(exit);
                }
            }

            let deadline = detector.deadline();

            tokio::select! {
                biased;

                () = link.kill.cancelled() => break Ending::Killed,

                status = process.wait(), if exit.is_none() => match status {
                    Ok(status) => exit = Some(status),
                    Err(err) => break Ending::Failed(err),
                },

                chunk = stdout.next(), if stdout_open => match chunk {
                    Some(Ok(chunk)) => {
                        let text = detector.on_output(&chunk, Instant::now()).to_owned();
                        link.set_waiting(false);
                        conn.emit(ServerEvent::Output { text }).await;
                    }
                    Some(Err(err)) => {
                        break Ending::Failed(AppError::Runtime(format!("stdout: {err}")));
                    }
                    None => stdout_open = false,
                },

                chunk = stderr.next(), if stderr_open => match chunk {
                    Some(Ok(chunk)) => {
                        let text = strip_trailing_newline(&chunk).to_owned();
                        conn.emit(ServerEvent::Stderr { text }).await;
                    }
                    Some(Err(err)) => {
                        break Ending::Failed(AppError::Runtime(format!("stderr: {err}")));
                    }
                    None => stderr_open = false,
                },

                Some(SessionCommand::Input(text)) = link.commands.recv() => {
                    detector.on_input();
                    link.set_waiting(false);
                    // A closed stdin is not fatal; the exit path reports the outcome.
                    if let Err(err) = stdin.write_line(&text).await {
                        warn!(%err, "failed to forward input");
                    }
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && exit.is_none() =>
                {
                    if detector.on_deadline(Instant::now()) {
                        link.set_waiting(true);
                        debug!(state = ?detector.state(), "input requested");
                        conn.emit(ServerEvent::InputRequest).await;
                    }
                }
            }
        };

        detector.terminate();
        link.set_waiting(false);
        self.conclude(conn, run_id, ending, &mut process, &link).await
    }

    /// Report how a session ended, then release its files if the driver
    /// still owns them.
    async fn conclude(
        &self,
        conn: &Connection,
        run_id: RunId,
        ending: Ending,
        process: &mut ChildProcess,
        link: &SessionLink,
    ) -> RunReport {
        let outcome = match ending {
            Ending::Exited(exit) => {
                info!(code = exit.code, signal = exit.signal, "program finished");
                link.reaped.cancel();
                conn.emit(ServerEvent::Finished(exit.clone())).await;
                RunOutcome::Finished(exit)
            }
            Ending::Killed => {
                reap(process).await;
                link.reaped.cancel();
                if conn.is_closed() {
                    info!("program killed after disconnect");
                } else {
                    info!("program killed by server");
                    conn.emit(ServerEvent::error(KILLED_BY_SERVER)).await;
                }
                RunOutcome::Killed
            }
            Ending::Failed(err) => {
                warn!(%err, "session failed");
                conn.emit(ServerEvent::error(err.to_string())).await;
                reap(process).await;
                link.reaped.cancel();
                RunOutcome::Failed
            }
        };

        let cleanup = match self.inner.registry.remove_run(conn.id(), run_id) {
            Some(session) => Some(cleanup::release(session.resources()).await),
            None => None,
        };
        RunReport::new(outcome, cleanup)
    }
}

/// Kill and reap a process, logging rather than failing.
async fn reap(process: &mut ChildProcess) {
    process.kill();
    if let Err(err) = process.wait().await {
        warn!(pid = process.pid(), %err, "failed to reap process");
    }
}

/// Kill a removed session, wait for its driver to reap the process, then
/// release its files.
async fn teardown(session: Session) -> CleanupReport {
    session.kill();
    session.reaped().await;
    let report = cleanup::release(session.resources()).await;
    info!(
        run_id = %session.run_id(),
        language = %session.language(),
        pid = session.pid(),
        removed = report.removed.len(),
        failed = report.failed.len(),
        "session resources released"
    );
    report
}
