#![forbid(unsafe_code)]

//! `code-relay` — interactive code runner server binary.
//!
//! Bootstraps configuration, prepares the shared temp directory, and
//! serves the WebSocket transport until ctrl-c or SIGTERM. On shutdown
//! every live program is killed and its files are released.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use code_relay::config::GlobalConfig;
use code_relay::orchestrator::SessionCoordinator;
use code_relay::runner::ToolchainRunner;
use code_relay::transport;
use code_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "code-relay", about = "Interactive code runner server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the listening port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the shared temp directory.
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("code-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }
    config.validate()?;
    config.ensure_temp_dir()?;
    info!(temp_dir = %config.temp_dir.display(), "configuration loaded");

    // ── Build the coordinator ───────────────────────────
    let runner = ToolchainRunner::new(config.temp_dir.clone(), config.toolchain.clone());
    let coordinator = SessionCoordinator::new(Arc::new(runner), config.detector.clone());

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let failed_ct = ct.clone();
    let server_config = config.clone();
    let server_coordinator = coordinator.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = transport::serve(&server_config, server_coordinator, server_ct).await {
            error!(%err, "transport failed");
            failed_ct.cancel();
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => {}
    }
    ct.cancel();

    let torn_down = coordinator.shutdown().await;
    info!(sessions = torn_down, "live sessions torn down");

    if let Err(err) = server_handle.await {
        error!(%err, "transport task panicked");
    }
    info!("code-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
