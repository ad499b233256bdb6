// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle management.
//!
//! Inbound frames are dispatched sequentially (one session, one reader);
//! each assignment is claimed, tracked, and executed in its own task. The
//! control plane is the source of truth for task state: status frames are
//! idempotent by task id and enqueue failures never stop execution.

use crate::config::WorkerConfig;
use crate::connection::Outbound;
use crate::executor::{ExecutionResult, Executor};
use dh_core::TaskId;
use dh_runtime::ContainerRuntime;
use dh_wire::{TaskAssignment, TaskClaimed, TaskCompleted, TaskFailed};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grace period between cancelling active tasks and tearing down the worker,
/// so terminal frames can flush.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Dispatches assignments and tracks their execution.
pub struct TaskManager {
    config: Arc<WorkerConfig>,
    executor: Executor,
    outbound: Outbound,
    /// Cancellation handles of in-flight tasks, keyed by task id. Entries
    /// are removed when the executor returns, on every path.
    active: Mutex<HashMap<TaskId, CancellationToken>>,
    /// Worker-wide token; task tokens are children of it.
    cancel: CancellationToken,
}

impl TaskManager {
    pub fn new(
        config: Arc<WorkerConfig>,
        runtime: Arc<dyn ContainerRuntime>,
        outbound: Outbound,
        platform: String,
        cancel: CancellationToken,
    ) -> Self {
        let executor = Executor::new(runtime, Arc::clone(&config), platform);
        Self { config, executor, outbound, active: Mutex::new(HashMap::new()), cancel }
    }

    /// Number of tasks currently executing.
    pub fn active_tasks(&self) -> usize {
        self.active.lock().len()
    }

    /// Decode and dispatch one inbound frame. Unknown types are dropped
    /// with a warning; the channel carries no other recognized frames today.
    pub async fn handle_frame(self: &Arc<Self>, text: &str) {
        let envelope = match dh_wire::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "failed to decode frame");
                return;
            }
        };

        match envelope.kind.as_str() {
            dh_wire::TASK_ASSIGNMENT => match envelope.payload::<TaskAssignment>() {
                Ok(assignment) => self.handle_assignment(assignment).await,
                Err(e) => error!(error = %e, "failed to decode task assignment"),
            },
            other => warn!(kind = other, "unknown frame type"),
        }
    }

    /// Claim the task, record it, and spawn its executor.
    ///
    /// There is no admission gate: a burst of assignments runs concurrently,
    /// bounded only by the control plane's assignment rate.
    async fn handle_assignment(self: &Arc<Self>, assignment: TaskAssignment) {
        let task_id = assignment.task_id.clone();
        info!(task_id = %task_id, title = %assignment.task.title, "received task assignment");

        // Claim before execute: the control plane treats the claim as a
        // precondition for later states. An enqueue failure is logged and
        // execution proceeds; the control plane reconciles.
        if let Err(e) = self.send_claimed(&task_id).await {
            error!(task_id = %task_id, error = %e, "failed to send task claimed message");
        }

        let task_token = self.cancel.child_token();
        self.active.lock().insert(task_id.clone(), task_token.clone());

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.execute_and_report(assignment, task_token).await;
        });
    }

    async fn execute_and_report(self: Arc<Self>, assignment: TaskAssignment, cancel: CancellationToken) {
        let task_id = assignment.task_id.clone();
        let _release = ActiveGuard { manager: Arc::clone(&self), task_id: task_id.clone() };

        info!(task_id = %task_id, title = %assignment.task.title, "starting task execution");
        match self.executor.execute(&assignment, &cancel).await {
            Err(e) => {
                error!(task_id = %task_id, error = %e, "task failed");
                // Nothing was captured before the failure; the frame carries
                // the message and empty partial fields.
                let partial = ExecutionResult::default();
                if let Err(send_err) =
                    self.send_failed(&task_id, format!("Task failed: {}", e), partial).await
                {
                    error!(task_id = %task_id, error = %send_err, "failed to send task failed message");
                }
            }
            Ok(result) => {
                let exit_code = result.exit_code;
                if let Err(send_err) = self.send_completed(&task_id, result).await {
                    error!(task_id = %task_id, error = %send_err, "failed to send task completed message");
                }
                if exit_code == 0 {
                    info!(task_id = %task_id, "task completed successfully");
                } else {
                    warn!(task_id = %task_id, exit_code, "task completed with non-zero exit code");
                }
            }
        }
    }

    async fn send_claimed(&self, task_id: &TaskId) -> Result<(), FrameSendError> {
        let frame = TaskClaimed {
            task_id: task_id.clone(),
            worker_id: self.config.worker_id.clone(),
        }
        .encode()?;
        self.outbound.send(frame).await?;
        Ok(())
    }

    async fn send_completed(
        &self,
        task_id: &TaskId,
        result: ExecutionResult,
    ) -> Result<(), FrameSendError> {
        let frame = TaskCompleted {
            task_id: task_id.clone(),
            worker_id: self.config.worker_id.clone(),
            output: result.output,
            exit_code: result.exit_code,
            artifacts: result.artifacts,
            session_link: result.session_link,
        }
        .encode()?;
        self.outbound.send(frame).await?;
        Ok(())
    }

    async fn send_failed(
        &self,
        task_id: &TaskId,
        message: String,
        partial: ExecutionResult,
    ) -> Result<(), FrameSendError> {
        let frame = TaskFailed {
            task_id: task_id.clone(),
            message,
            output: partial.output,
            artifacts: partial.artifacts,
            session_link: partial.session_link,
        }
        .encode()?;
        self.outbound.send(frame).await?;
        Ok(())
    }

    /// Cancel every active task, then wait the grace period so
    /// cancellations propagate and terminal frames flush.
    pub async fn shutdown(&self) {
        let tokens: Vec<CancellationToken> = {
            let active = self.active.lock();
            if !active.is_empty() {
                info!(count = active.len(), "cancelling active tasks");
            }
            active
                .iter()
                .map(|(task_id, token)| {
                    debug!(task_id = %task_id, "cancelling task");
                    token.clone()
                })
                .collect()
        };

        if tokens.is_empty() {
            return;
        }
        for token in tokens {
            token.cancel();
        }
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    }
}

/// Removes the active-table entry when the executor returns, on every path.
struct ActiveGuard {
    manager: Arc<TaskManager>,
    task_id: TaskId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.manager.active.lock().remove(self.task_id.as_str());
    }
}

#[derive(Debug, thiserror::Error)]
enum FrameSendError {
    #[error(transparent)]
    Protocol(#[from] dh_wire::ProtocolError),
    #[error(transparent)]
    Send(#[from] crate::connection::SendError),
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
