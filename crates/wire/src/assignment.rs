// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound task assignment payloads.

use dh_core::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A control-plane directive to run one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub task: TaskSpec,
    /// Primary container image. Empty means the worker's default image.
    #[serde(default)]
    pub docker_image: String,
    /// Image whose extracted rootfs provides the agent payload. Required.
    #[serde(default)]
    pub sidecar_image: String,
    /// Extra sidecar filesystems to mount alongside the agent payload.
    #[serde(default)]
    pub additional_sidecars: Vec<SidecarMount>,
    /// Environment passed through to the task container.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// The task descriptor embedded in an assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub agent_config_snapshot: AgentConfigSnapshot,
    /// Task-specific arguments appended to the agent command line.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Snapshot of the agent configuration the task was created under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigSnapshot {
    /// Execution environment the task references, when one was configured.
    #[serde(default)]
    pub environment_id: Option<String>,
}

/// One extra sidecar filesystem mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarMount {
    pub image: String,
    pub mount_path: String,
    /// Mount writable instead of the read-only default.
    #[serde(default)]
    pub read_write: bool,
}

#[cfg(test)]
#[path = "assignment_tests.rs"]
mod tests;
