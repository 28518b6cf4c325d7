#![forbid(unsafe_code)]

//! `dropgate` — single-use upload link server binary.
//!
//! Bootstraps configuration, connects the database, starts the
//! retention service, and serves the HTTP transport until a shutdown
//! signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use dropgate::config::{GlobalConfig, RemoteProtocol};
use dropgate::http::{self, AppState};
use dropgate::lifecycle::SessionController;
use dropgate::notify::{NoopNotifier, Notifier, SmtpNotifier};
use dropgate::persistence::{db, retention};
use dropgate::transfer::client::TransferClient;
use dropgate::transfer::ftp::FtpBackend;
use dropgate::transfer::http::HttpBackend;
use dropgate::transfer::RemoteBackend;
use dropgate::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dropgate", about = "Single-use upload link server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP listen port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("dropgate server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    // Load the admin key and remote/SMTP passwords from keyring / env vars.
    config.load_credentials().await?;

    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    // ── Start retention service ─────────────────────────
    let ct = CancellationToken::new();
    let retention_handle = retention::spawn_retention_task(
        Arc::clone(&db),
        config.scratch_dir(),
        config.retention_days,
        ct.clone(),
    );
    info!("retention service started");

    // ── Build transfer and notification stacks ──────────
    let backend: Arc<dyn RemoteBackend> = match config.remote.protocol {
        RemoteProtocol::Ftp => Arc::new(FtpBackend::new(&config.remote, &config.transfer)),
        RemoteProtocol::Http => Arc::new(HttpBackend::new(&config.remote, &config.transfer)?),
    };
    let client = TransferClient::new(backend, config.transfer.clone());

    let notifier: Arc<dyn Notifier> = if config.notify.smtp_host.is_some() {
        Arc::new(SmtpNotifier::new(&config.notify)?)
    } else {
        info!("smtp not configured; notifications will be logged only");
        Arc::new(NoopNotifier)
    };

    let controller = SessionController::new(Arc::clone(&config), db, client, notifier);
    let state = AppState {
        config: Arc::clone(&config),
        controller,
    };

    // ── Serve HTTP until shutdown ───────────────────────
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(state, http_ct).await {
            error!(%err, "http transport failed");
        }
    });

    info!("dropgate server ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle, retention_handle);
    info!("dropgate shut down");

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
