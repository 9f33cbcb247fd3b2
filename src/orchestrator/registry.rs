//! Keyed store of live sessions, one per connection.
//!
//! The registry is the single point deciding who tears a session down:
//! [`SessionRegistry::remove`] is an atomic find-and-delete, so when a
//! disconnect and a process exit race for the same session exactly one of
//! them receives the [`Session`] (and with it the resource list); the other
//! gets `None` and does nothing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::ids::{ConnectionId, RunId};
use crate::runner::Language;
use crate::{AppError, Result};

/// Commands delivered to a session's driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Forward one line to the program's stdin.
    Input(String),
}

/// Registry entry for one running program.
#[derive(Debug)]
pub struct Session {
    run_id: RunId,
    language: Language,
    pid: Option<u32>,
    resources: Vec<PathBuf>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    waiting: Arc<AtomicBool>,
    kill: CancellationToken,
    reaped: CancellationToken,
}

/// Driver-side ends of a [`Session`]'s channels.
#[derive(Debug)]
pub struct SessionLink {
    /// Commands from the client.
    pub commands: mpsc::UnboundedReceiver<SessionCommand>,
    /// Fires when the session must be killed.
    pub kill: CancellationToken,
    /// Cancelled by the driver once the process has been reaped.
    pub reaped: CancellationToken,
    waiting: Arc<AtomicBool>,
}

impl SessionLink {
    /// Mirror the detector's waiting flag into the registry entry.
    pub fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }
}

impl Session {
    /// Build an entry and the matching driver link.
    ///
    /// `kill` is normally a child of the connection's token so that a
    /// disconnect reaches every session of the connection.
    #[must_use]
    pub fn new(
        run_id: RunId,
        language: Language,
        pid: Option<u32>,
        resources: Vec<PathBuf>,
        kill: CancellationToken,
    ) -> (Self, SessionLink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let waiting = Arc::new(AtomicBool::new(false));
        let reaped = CancellationToken::new();

        let session = Self {
            run_id,
            language,
            pid,
            resources,
            commands: tx,
            waiting: Arc::clone(&waiting),
            kill: kill.clone(),
            reaped: reaped.clone(),
        };
        let link = SessionLink {
            commands: rx,
            kill,
            reaped,
            waiting,
        };
        (session, link)
    }

    /// Run that created this session.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Language of the running program.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// OS process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Files owned by this session.
    #[must_use]
    pub fn resources(&self) -> &[PathBuf] {
        &self.resources
    }

    /// Ask the driver to kill the process. Idempotent.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Wait until the driver has reaped the process.
    pub async fn reaped(&self) {
        self.reaped.cancelled().await;
    }

    fn handle(&self) -> SessionHandle {
        SessionHandle {
            run_id: self.run_id,
            commands: self.commands.clone(),
            waiting: Arc::clone(&self.waiting),
        }
    }
}

/// Cheap view of a registered session returned by [`SessionRegistry::lookup`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    run_id: RunId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    waiting: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Run that created the session.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether an `input_request` is outstanding.
    #[must_use]
    pub fn waiting_for_input(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Queue a line for the program's stdin.
    ///
    /// Returns `false` if the driver has already stopped.
    pub fn send_input(&self, text: String) -> bool {
        self.commands.send(SessionCommand::Input(text)).is_ok()
    }
}

/// Map from connection id to its single live session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `session` as the live session of `conn`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyRunning` if `conn` already has a session;
    /// the registered one is left untouched.
    pub fn register(&self, conn: ConnectionId, session: Session) -> Result<()> {
        let mut sessions = self.lock();
        if sessions.contains_key(&conn) {
            return Err(AppError::AlreadyRunning(format!(
                "{conn} already has a running program"
            )));
        }
        sessions.insert(conn, session);
        Ok(())
    }

    /// Handle to the live session of `conn`, if any.
    #[must_use]
    pub fn lookup(&self, conn: ConnectionId) -> Option<SessionHandle> {
        self.lock().get(&conn).map(Session::handle)
    }

    /// Whether `conn` has a live session.
    #[must_use]
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.lock().contains_key(&conn)
    }

    /// Atomically take the session of `conn`. Returns it exactly once.
    pub fn remove(&self, conn: ConnectionId) -> Option<Session> {
        self.lock().remove(&conn)
    }

    /// Take the session of `conn` only if it was created by `run_id`.
    pub fn remove_run(&self, conn: ConnectionId, run_id: RunId) -> Option<Session> {
        let mut sessions = self.lock();
        let owned = sessions
            .get(&conn)
            .is_some_and(|session| session.run_id == run_id);
        if owned {
            sessions.remove(&conn)
        } else {
            None
        }
    }

    /// Take every session (server shutdown).
    pub fn drain(&self) -> Vec<(ConnectionId, Session)> {
        self.lock().drain().collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
