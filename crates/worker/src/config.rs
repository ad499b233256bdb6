// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration.

use dh_core::WorkerId;

/// Immutable configuration a worker is constructed with.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bearer credential presented on dial.
    pub api_key: String,
    /// Identity this worker registers under.
    pub worker_id: WorkerId,
    /// WebSocket endpoint of the control-plane channel.
    pub channel_url: String,
    /// Server root URL handed through to tasks, opaque to the worker.
    pub server_root_url: String,
    /// Log level name, kept for diagnostics.
    pub log_level: String,
    /// Leave task containers behind for debugging.
    pub no_cleanup: bool,
    /// Additional host binds for task containers
    /// (`HOST_PATH:CONTAINER_PATH[:MODE]`).
    pub volumes: Vec<String>,
}
