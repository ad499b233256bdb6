// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact extraction from captured task output.
//!
//! Best-effort text mining: a session link is the first URL on a line
//! mentioning "session", and every GitHub pull request URL becomes an
//! artifact. Extraction never fails; unmatchable output yields nothing.

use chrono::{DateTime, Utc};
use dh_core::Artifact;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static SESSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)session[^\n]*?(https?://[^\s"'<>]+)"#)
        .expect("constant regex pattern is valid")
});

static PULL_REQUEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/pull/\d+")
        .expect("constant regex pattern is valid")
});

/// Scan output for artifacts and a session link.
///
/// Pull request URLs are deduplicated preserving first occurrence. The
/// timestamp is recorded on each artifact as its creation time.
pub fn extract(output: &str, now: DateTime<Utc>) -> (Vec<Artifact>, String) {
    if output.is_empty() {
        return (Vec::new(), String::new());
    }

    let session_link = SESSION_PATTERN
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str().to_string())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut artifacts = Vec::new();
    for url in PULL_REQUEST_PATTERN.find_iter(output) {
        if seen.insert(url.as_str()) {
            artifacts.push(Artifact::pull_request(url.as_str(), now));
        }
    }

    (artifacts, session_link)
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
