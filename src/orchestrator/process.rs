//! Child process spawning and supervision primitives.
//!
//! [`spawn`] starts the interactive program of a run and hands back a
//! [`ProcessHandle`] whose parts can be driven independently from one
//! `select!` loop: the stdin sink, two output chunk streams, and the
//! [`ChildProcess`] carrying termination and kill.
//!
//! [`run_to_completion`] runs a compile step: it collects all stderr and
//! resolves only once the compiler has exited.
//!
//! Every child is spawned with `kill_on_drop(true)` so a handle dropped on
//! any path cannot leak a running process.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use super::codec::ChunkCodec;
use crate::models::event::ExitIndicator;
use crate::runner::CommandSpec;
use crate::{AppError, Result};

/// Lazy stream of text chunks from one output pipe.
pub type OutputStream<R> = FramedRead<R, ChunkCodec>;

/// Write side of the child's standard input.
#[derive(Debug)]
pub struct StdinSink {
    inner: Option<ChildStdin>,
}

impl StdinSink {
    /// Append `text` and a line terminator, then flush.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the pipe is closed (typically because the
    /// program exited or closed its stdin).
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let stdin = self
            .inner
            .as_mut()
            .ok_or_else(|| AppError::Io("stdin already closed".into()))?;
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

/// Owned child process with cached exit status and idempotent kill.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    killed: bool,
    exit: Option<ExitIndicator>,
}

impl ChildProcess {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            killed: false,
            exit: None,
        }
    }

    /// OS process id captured at spawn.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to terminate. Cancel safe; repeated calls
    /// return the cached indicator.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` if the OS wait fails.
    pub async fn wait(&mut self) -> Result<ExitIndicator> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|err| AppError::Runtime(format!("failed to wait for process: {err}")))?;
        let exit = ExitIndicator::from(status);
        debug!(pid = self.pid, code = exit.code, signal = exit.signal, "process reaped");
        self.exit = Some(exit.clone());
        Ok(exit)
    }

    /// Send SIGKILL (or the platform equivalent) without waiting.
    ///
    /// No-op when the process was already killed or has been reaped.
    pub fn kill(&mut self) {
        if self.killed || self.exit.is_some() {
            return;
        }
        self.killed = true;
        match self.child.start_kill() {
            Ok(()) => info!(pid = self.pid, "process killed"),
            // Already exited but not yet reaped; nothing to kill.
            Err(err) => debug!(pid = self.pid, %err, "kill skipped"),
        }
    }
}

/// A spawned interactive program, split into independently pollable parts.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Termination notification and kill switch.
    pub process: ChildProcess,
    /// Standard input sink.
    pub stdin: StdinSink,
    /// Standard output chunks.
    pub stdout: OutputStream<ChildStdout>,
    /// Standard error chunks.
    pub stderr: OutputStream<ChildStderr>,
}

fn command_for(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).kill_on_drop(true);
    cmd
}

/// Start the interactive program of a run with all three stdio pipes.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the OS cannot start the program (missing
/// binary, permission denied, ...).
pub fn spawn(spec: &CommandSpec) -> Result<ProcessHandle> {
    let mut cmd = command_for(spec);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to start {spec}: {err}")))?;

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture stderr".into()))?;

    let process = ChildProcess::new(child);
    info!(pid = process.pid(), command = %spec, "process spawned");

    Ok(ProcessHandle {
        process,
        stdin: StdinSink { inner: stdin },
        stdout: FramedRead::new(stdout, ChunkCodec::new()),
        stderr: FramedRead::new(stderr, ChunkCodec::new()),
    })
}

/// Run `spec` to completion, succeeding iff it exits with code zero.
///
/// Standard output is discarded; standard error is collected in full. The
/// future is cancel safe: dropping it kills the child.
///
/// # Errors
///
/// Returns `AppError::Compile` carrying the collected stderr on a non-zero
/// exit, or the OS error text when the program cannot be started.
pub async fn run_to_completion(spec: &CommandSpec) -> Result<()> {
    let mut cmd = command_for(spec);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let child = cmd
        .spawn()
        .map_err(|err| AppError::Compile(format!("failed to start {spec}: {err}")))?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|err| AppError::Compile(format!("failed to wait for {spec}: {err}")))?;

    if output.status.success() {
        debug!(command = %spec, "compile step succeeded");
        Ok(())
    } else {
        let exit = ExitIndicator::from(output.status);
        warn!(command = %spec, code = exit.code, "compile step failed");
        Err(AppError::Compile(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}
