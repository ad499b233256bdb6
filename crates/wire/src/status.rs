// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound task status frames.
//!
//! Every frame carries the task id, making redelivery idempotent: the
//! control plane reconciles by id, so the worker never waits for an ack.

use crate::envelope::{encode_frame, ProtocolError};
use crate::{TASK_CLAIMED, TASK_COMPLETED, TASK_FAILED};
use dh_core::{Artifact, TaskId, WorkerId};
use serde::{Deserialize, Serialize};

/// The worker has accepted the task and will execute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskClaimed {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
}

/// The task's container ran to completion, with any exit code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub output: String,
    pub exit_code: i64,
    pub artifacts: Vec<Artifact>,
    pub session_link: String,
}

/// The task could not be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailed {
    pub task_id: TaskId,
    pub message: String,
    pub output: String,
    pub artifacts: Vec<Artifact>,
    pub session_link: String,
}

impl TaskClaimed {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_frame(TASK_CLAIMED, self)
    }
}

impl TaskCompleted {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_frame(TASK_COMPLETED, self)
    }
}

impl TaskFailed {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_frame(TASK_FAILED, self)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
