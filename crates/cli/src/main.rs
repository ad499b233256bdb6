// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dockhand` - self-hosted agent worker.
//!
//! Attaches to the control plane, executes assigned tasks in containers,
//! and reports status. Runs until SIGINT/SIGTERM, then drains gracefully.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use dh_worker::{Worker, WorkerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dockhand", about = "Self-hosted worker for agent tasks.", version)]
struct Cli {
    /// API key for authentication
    #[arg(long, env = "OZ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Worker host identifier
    #[arg(long, required = true)]
    worker_id: String,

    #[arg(long, default_value = "ws://localhost:8080/api/v1/selfhosted/worker/ws", hide = true)]
    channel_url: String,

    #[arg(long, default_value = "http://localhost:8080", hide = true)]
    server_root_url: String,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Do not remove containers after execution (for debugging)
    #[arg(long)]
    no_cleanup: bool,

    /// Volume mounts for task containers
    /// (format: HOST_PATH:CONTAINER_PATH or HOST_PATH:CONTAINER_PATH:MODE)
    #[arg(short = 'v', long = "volume")]
    volumes: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str())),
        )
        .init();

    let Some(api_key) = cli.api_key.filter(|k| !k.is_empty()) else {
        bail!("missing API key: set OZ_API_KEY or pass --api-key");
    };

    let config = WorkerConfig {
        api_key,
        worker_id: cli.worker_id.into(),
        channel_url: cli.channel_url,
        server_root_url: cli.server_root_url,
        log_level: cli.log_level.as_str().to_string(),
        no_cleanup: cli.no_cleanup,
        volumes: cli.volumes,
    };

    let worker = Worker::new(config).await.context("failed to create worker")?;
    let handle = worker.handle();

    let supervisor = tokio::spawn(worker.run());

    wait_for_shutdown_signal().await;

    handle.shutdown().await;

    // Let the supervisor unwind so the session close frame goes out.
    if let Err(e) = supervisor.await {
        error!(error = %e, "supervisor task failed");
    }
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            // Fall back to ctrl-c only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt, shutting down gracefully..."),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully..."),
    }
}
