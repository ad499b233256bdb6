// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task execution in a disposable container.
//!
//! An executor turns one assignment into one container run: resolve the
//! primary image, pull everything platform-pinned, mount the sidecar volume
//! (and any additional sidecars), run the fixed agent command, capture
//! output, and mine it for artifacts. The container is force-removed on
//! every exit path unless the worker was configured to keep it.

use crate::artifacts;
use crate::config::WorkerConfig;
use crate::sidecar::{self, SidecarError};
use chrono::Utc;
use dh_core::Artifact;
use dh_runtime::{archive, auth, ContainerRuntime, ContainerSpec, RuntimeError};
use dh_wire::{SidecarMount, TaskAssignment};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Image used when the assignment names none.
pub const DEFAULT_IMAGE: &str = "ubuntu:22.04";
/// Mount point of the agent payload inside the task container.
pub const AGENT_MOUNT: &str = "/agent";
/// Working directory of the task container.
pub const WORKSPACE_DIR: &str = "/workspace";
/// Structured output the in-container agent may leave behind. Preferred over
/// the multiplexed log stream when present and non-empty.
pub const AGENT_OUTPUT_PATH: &str = "/workspace/.oz/agent_output.txt";

/// What a finished container run produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub artifacts: Vec<Artifact>,
    pub session_link: String,
    pub exit_code: i64,
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self { output: String::new(), artifacts: Vec::new(), session_link: String::new(), exit_code: -1 }
    }
}

/// Errors from task execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no sidecar image specified in assignment")]
    MissingSidecarImage,
    #[error("additional sidecar has empty image")]
    EmptySidecarImage,
    #[error("additional sidecar {0} has empty mount path")]
    EmptyMountPath(String),
    #[error("duplicate mount path {path} for additional sidecar {image}")]
    DuplicateMountPath { path: String, image: String },
    #[error("failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error(transparent)]
    Sidecar(#[from] SidecarError),
    #[error("failed to create container: {0}")]
    Create(#[source] RuntimeError),
    #[error("failed to start container: {0}")]
    Start(#[source] RuntimeError),
    #[error("error waiting for container: {0}")]
    Wait(#[source] RuntimeError),
    #[error("task cancelled")]
    Cancelled,
}

/// Executes assignments against a container runtime.
pub struct Executor {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<WorkerConfig>,
    /// Host platform every pull is pinned to, e.g. `linux/amd64`.
    platform: String,
}

impl Executor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: Arc<WorkerConfig>, platform: String) -> Self {
        Self { runtime, config, platform }
    }

    /// Run one assignment to completion and capture its result.
    pub async fn execute(
        &self,
        assignment: &TaskAssignment,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let task = &assignment.task;

        let image = if !assignment.docker_image.is_empty() {
            debug!(image = %assignment.docker_image, "using image from assignment");
            assignment.docker_image.clone()
        } else {
            match &task.agent_config_snapshot.environment_id {
                Some(environment) => warn!(
                    environment = %environment,
                    default = DEFAULT_IMAGE,
                    "environment specified but no image resolved; using default"
                ),
                None => info!(default = DEFAULT_IMAGE, "no environment specified, using default image"),
            }
            DEFAULT_IMAGE.to_string()
        };

        let auth = auth::resolve(&image);
        self.pull(&image, auth.as_deref(), cancel).await?;

        if assignment.sidecar_image.is_empty() {
            return Err(ExecutorError::MissingSidecarImage);
        }
        // Sidecar images are public; no auth.
        self.pull(&assignment.sidecar_image, None, cancel).await?;

        let agent_volume =
            sidecar::ensure_volume(self.runtime.as_ref(), &assignment.sidecar_image, cancel).await?;

        let mut binds = vec![format!("{}:{}:ro", agent_volume, AGENT_MOUNT)];
        binds.extend(self.prepare_additional_sidecars(&assignment.additional_sidecars, cancel).await?);
        binds.extend(self.config.volumes.iter().cloned());

        let mut env = vec![
            format!("TASK_ID={}", task.id),
            "GIT_TERMINAL_PROMPT=0".to_string(),
            "GH_PROMPT_DISABLED=1".to_string(),
        ];
        for (key, value) in &assignment.env_vars {
            env.push(format!("{}={}", key, value));
        }

        let mut cmd: Vec<String> = [
            "/bin/sh",
            "/agent/entrypoint.sh",
            "agent",
            "run",
            "--share",
            "team:edit",
            "--task-id",
            task.id.as_str(),
            "--sandboxed",
            "--server-root-url",
            self.config.server_root_url.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        cmd.extend(task.args.iter().cloned());

        debug!(image = %image, "creating container");
        let spec = ContainerSpec {
            image,
            cmd,
            env,
            working_dir: Some(WORKSPACE_DIR.to_string()),
            binds,
            ..ContainerSpec::default()
        };
        let container_id = self.runtime.create_container(&spec).await.map_err(ExecutorError::Create)?;
        debug!(container = %container_id, "created container");

        let outcome = self.run_container(&container_id, cancel).await;

        if !self.config.no_cleanup {
            if let Err(e) = self.runtime.remove_container(&container_id, true).await {
                debug!(container = %container_id, error = %e, "container already removed or removal failed");
            }
        }

        outcome
    }

    /// Start the created container, await its exit, and capture output.
    async fn run_container(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.runtime.start_container(container_id).await.map_err(ExecutorError::Start)?;
        debug!(container = %container_id, "started container");

        let exit_code = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            status = self.runtime.wait_container(container_id) => status.map_err(ExecutorError::Wait)?,
        };
        debug!(container = %container_id, exit_code, "container exited");

        let log_output = match self.runtime.container_logs(container_id).await {
            Ok(output) => output,
            Err(e) => {
                warn!(container = %container_id, error = %e, "failed to get container logs");
                String::new()
            }
        };
        if !log_output.is_empty() {
            if exit_code != 0 {
                info!(container = %container_id, "container output:\n{}", log_output);
            } else {
                debug!(container = %container_id, "container output:\n{}", log_output);
            }
        }

        // Prefer output written by the agent (clean text) over the
        // multiplexed log stream.
        let output = match self.read_output_file(container_id).await {
            Some(text) if !text.is_empty() => text,
            _ => log_output,
        };

        let (artifacts, session_link) = artifacts::extract(&output, Utc::now());
        Ok(ExecutionResult { output, artifacts, session_link, exit_code })
    }

    /// Read the agent's structured output file, if it exists. Missing or
    /// unreadable files are a silent fallback, not an error.
    async fn read_output_file(&self, container_id: &str) -> Option<String> {
        match self.runtime.copy_from_container(container_id, AGENT_OUTPUT_PATH).await {
            Ok(archive_bytes) => archive::first_regular_file(&archive_bytes)
                .map(|contents| String::from_utf8_lossy(&contents).into_owned()),
            Err(e) => {
                debug!(container = %container_id, error = %e, "no agent output file; falling back to logs");
                None
            }
        }
    }

    /// Validate, pull, and mount the assignment's extra sidecars.
    ///
    /// Validation runs over the whole list before any image is pulled so a
    /// bad entry fails the task without touching the runtime.
    async fn prepare_additional_sidecars(
        &self,
        sidecars: &[SidecarMount],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ExecutorError> {
        let mut seen_mount_paths = HashSet::new();
        for mount in sidecars {
            if mount.image.is_empty() {
                return Err(ExecutorError::EmptySidecarImage);
            }
            if mount.mount_path.is_empty() {
                return Err(ExecutorError::EmptyMountPath(mount.image.clone()));
            }
            if !seen_mount_paths.insert(mount.mount_path.as_str()) {
                return Err(ExecutorError::DuplicateMountPath {
                    path: mount.mount_path.clone(),
                    image: mount.image.clone(),
                });
            }
        }

        let mut binds = Vec::new();
        for mount in sidecars {
            info!(image = %mount.image, mount = %mount.mount_path, "preparing additional sidecar");
            // Additional sidecar images are public; no auth.
            self.pull(&mount.image, None, cancel).await?;
            let volume = sidecar::ensure_volume(self.runtime.as_ref(), &mount.image, cancel).await?;
            // The runtime defaults to read-write when no mode suffix is given.
            let mode = if mount.read_write { "" } else { ":ro" };
            binds.push(format!("{}:{}{}", volume, mount.mount_path, mode));
        }
        Ok(binds)
    }

    async fn pull(
        &self,
        image: &str,
        auth: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        info!(image, "pulling image");
        tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            result = self.runtime.pull_image(image, &self.platform, auth) => {
                result.map_err(|source| ExecutorError::Pull { image: image.to_string(), source })?;
            }
        }
        info!(image, "successfully pulled image");
        Ok(())
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
