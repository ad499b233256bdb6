// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker assembly: runtime probe, channel wiring, graceful shutdown.

use crate::config::WorkerConfig;
use crate::connection::{Connection, Outbound, SEND_QUEUE_CAPACITY};
use crate::lifecycle::TaskManager;
use dh_runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long the startup daemon probe may take.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Platforms the sidecar payload supports; pulls are pinned to the daemon's.
const SUPPORTED_PLATFORMS: [&str; 2] = ["linux/amd64", "linux/arm64"];

/// Errors from worker construction.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to create container runtime client: {0}")]
    Client(#[source] RuntimeError),
    #[error("timed out reaching container daemon")]
    PingTimeout,
    #[error("failed to reach container daemon: {0}")]
    DaemonUnreachable(#[source] RuntimeError),
    #[error("failed to get daemon version: {0}")]
    Version(#[source] RuntimeError),
    #[error("unsupported daemon platform {0} (only linux/amd64 and linux/arm64 are supported)")]
    UnsupportedPlatform(String),
}

/// A fully wired worker. [`Worker::run`] blocks until shutdown; shutdown is
/// driven through the [`WorkerHandle`].
pub struct Worker {
    connection: Connection,
    handle: WorkerHandle,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

/// Cloneable handle for observing and shutting down a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    manager: Arc<TaskManager>,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").finish_non_exhaustive()
    }
}

impl Worker {
    /// Construct a worker against the platform Docker daemon.
    pub async fn new(config: WorkerConfig) -> Result<Self, WorkerError> {
        let runtime = DockerRuntime::from_env().map_err(WorkerError::Client)?;
        Self::with_runtime(config, Arc::new(runtime)).await
    }

    /// Construct a worker against any container runtime. Probes daemon
    /// liveness and enforces the supported-platform gate.
    pub async fn with_runtime(
        config: WorkerConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, WorkerError> {
        match tokio::time::timeout(PING_TIMEOUT, runtime.ping()).await {
            Err(_) => return Err(WorkerError::PingTimeout),
            Ok(Err(e)) => return Err(WorkerError::DaemonUnreachable(e)),
            Ok(Ok(())) => {}
        }

        let (os, arch) = runtime.server_platform().await.map_err(WorkerError::Version)?;
        let platform = format!("{}/{}", os, arch);
        if !SUPPORTED_PLATFORMS.contains(&platform.as_str()) {
            if let Err(e) = runtime.close().await {
                warn!(error = %e, "failed to close runtime client");
            }
            return Err(WorkerError::UnsupportedPlatform(platform));
        }
        debug!(platform = %platform, "container daemon is reachable");

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let outbound = Outbound::new(outbound_tx, cancel.clone());

        let config = Arc::new(config);
        let manager = Arc::new(TaskManager::new(
            Arc::clone(&config),
            Arc::clone(&runtime),
            outbound,
            platform,
            cancel.clone(),
        ));
        let connection =
            Connection::new(config, Arc::clone(&manager), outbound_rx, cancel.clone());

        Ok(Self { connection, handle: WorkerHandle { manager, runtime, cancel } })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Supervise the control-plane session until shutdown.
    pub async fn run(self) {
        self.connection.run().await;
    }
}

impl WorkerHandle {
    /// Number of tasks currently executing.
    pub fn active_tasks(&self) -> usize {
        self.manager.active_tasks()
    }

    /// Graceful shutdown: cancel active tasks, wait the grace period so
    /// terminal frames flush, then cancel the worker and close the runtime
    /// client. The supervisor sends the session close frame as it unwinds.
    pub async fn shutdown(&self) {
        info!("shutting down worker...");
        self.manager.shutdown().await;
        self.cancel.cancel();
        if let Err(e) = self.runtime.close().await {
            warn!(error = %e, "failed to close runtime client");
        }
        info!("worker shutdown complete");
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
