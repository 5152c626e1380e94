#![forbid(unsafe_code)]

//! `remote-file-agent`: serves local files to an editor daemon.
//!
//! Opens the launch path, connects the main connection and the worker pool,
//! and runs until interrupted or until every connection ends.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use remote_file_agent::config::AgentConfig;
use remote_file_agent::handlers::{LaunchTarget, OpenTarget};
use remote_file_agent::identity::Identity;
use remote_file_agent::session::SessionManager;
use remote_file_agent::{AppError, Result};

/// Missing path, usage error, or startup failure.
const EXIT_FAILURE: u8 = 1;
/// The launch path is a directory.
const EXIT_DIRECTORY: u8 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "remote-file-agent", about = "Remote file access agent", version, long_about = None)]
struct Cli {
    /// File to open in the daemon. Created on first save if it does not exist.
    path: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_FAILURE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(EXIT_FAILURE);
    }

    let Some(path) = args.path else {
        eprintln!("Specify a filename");
        return ExitCode::from(EXIT_FAILURE);
    };

    // ── Open the launch file before any connection ──────
    let target = match LaunchTarget::resolve(&path) {
        Ok(LaunchTarget::File(target)) => target,
        Ok(LaunchTarget::Directory(path)) => {
            eprintln!("Path is a directory: {}", path.display());
            return ExitCode::from(EXIT_DIRECTORY);
        }
        Err(err) => {
            error!(%err, "cannot use launch path");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args.config, target)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "agent failed to start");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(config_path: Option<PathBuf>, target: OpenTarget) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match config_path {
        Some(path) => AgentConfig::load_from_path(path)?,
        None => AgentConfig::default(),
    };
    let identity = Identity::detect()?;
    info!(%identity, port = config.port, "configuration loaded");

    // ── Start connections ───────────────────────────────
    let ct = CancellationToken::new();
    let manager = SessionManager::new(&config, identity);
    let handle = manager.start(Some(target), ct);

    // ── Wait for shutdown signal or natural end ─────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            handle.shutdown().await;
        }
        () = handle.wait() => {
            info!("all connections closed");
        }
    }

    info!("remote-file-agent shut down");
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
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

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
