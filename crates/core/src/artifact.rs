// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact records attached to task status frames.
//!
//! Artifacts are a tagged union keyed by `artifact_type` so new kinds can be
//! added without the transport layer branching on them. Today the only kind
//! is a pull request link mined from task output.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A linkable artifact produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "artifact_type")]
pub enum Artifact {
    #[serde(rename = "PULL_REQUEST")]
    PullRequest {
        /// RFC 3339 UTC timestamp of when the artifact was recorded.
        created_at: String,
        data: PullRequest,
    },
}

/// Pull request details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub branch: String,
    pub url: String,
}

impl Artifact {
    /// Record a pull request URL. The branch is not recoverable from the
    /// URL alone.
    pub fn pull_request(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Artifact::PullRequest {
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            data: PullRequest { branch: "unknown".to_string(), url: url.into() },
        }
    }

    /// The URL this artifact links to.
    pub fn url(&self) -> &str {
        match self {
            Artifact::PullRequest { data, .. } => &data.url,
        }
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
