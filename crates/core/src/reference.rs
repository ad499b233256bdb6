// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container image reference parsing.
//!
//! Normalizes references the way container tooling does: a bare name like
//! `ubuntu:22.04` expands to `docker.io/library/ubuntu:22.04`, while a name
//! whose first component looks like a hostname (`ghcr.io/acme/agent`) keeps
//! that component as the registry domain.

use thiserror::Error;

/// Default registry domain for references without an explicit one.
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Implied namespace for single-component Docker Hub references.
const OFFICIAL_NAMESPACE: &str = "library";

/// Credential-store key for Docker Hub (the legacy index endpoint).
pub const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// Errors from image reference parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty image reference")]
    Empty,
    #[error("invalid image reference: {0}")]
    InvalidName(String),
}

/// A normalized image reference split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Registry domain, e.g. `docker.io` or `ghcr.io`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Fully-qualified repository path within the registry, e.g.
    /// `library/ubuntu` or `acme/agent`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The repository path in its short human form: no registry domain, and
    /// no implied `library/` namespace for Docker Hub references.
    pub fn familiar_path(&self) -> &str {
        if self.domain == DEFAULT_DOMAIN {
            self.path.strip_prefix("library/").unwrap_or(&self.path)
        } else {
            &self.path
        }
    }

    /// The key used to look up registry credentials in the user's container
    /// config. Docker Hub uses the legacy index endpoint; every other
    /// registry is keyed by its hostname.
    pub fn registry_auth_key(&self) -> &str {
        if self.domain == DEFAULT_DOMAIN {
            DOCKER_HUB_AUTH_KEY
        } else {
            &self.domain
        }
    }
}

/// Parse and normalize an image reference.
pub fn parse(input: &str) -> Result<ImageRef, ReferenceError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ReferenceError::Empty);
    }
    if input.chars().any(char::is_whitespace) {
        return Err(ReferenceError::InvalidName(input.to_string()));
    }

    // Digest first: it contains a colon, so it must come off before the tag
    // separator is located.
    let (rest, digest) = match input.split_once('@') {
        Some((name, d)) if !d.is_empty() => (name, Some(d.to_string())),
        Some(_) => return Err(ReferenceError::InvalidName(input.to_string())),
        None => (input, None),
    };

    // The first component is a domain only when it looks like a hostname.
    let (domain, remainder) = match rest.split_once('/') {
        Some((first, remainder))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), remainder)
        }
        _ => (DEFAULT_DOMAIN.to_string(), rest),
    };

    let (path, tag) = match remainder.rsplit_once(':') {
        Some((name, t)) if !t.is_empty() && !t.contains('/') => (name, Some(t.to_string())),
        Some(_) => return Err(ReferenceError::InvalidName(input.to_string())),
        None => (remainder, None),
    };

    if path.is_empty() {
        return Err(ReferenceError::InvalidName(input.to_string()));
    }
    for component in path.split('/') {
        if !valid_path_component(component) {
            return Err(ReferenceError::InvalidName(input.to_string()));
        }
    }

    let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
        format!("{}/{}", OFFICIAL_NAMESPACE, path)
    } else {
        path.to_string()
    };

    Ok(ImageRef { domain, path, tag, digest })
}

/// Repository path components are lowercase alphanumerics joined by the
/// separators `.`, `_`, and `-`, never leading or trailing.
fn valid_path_component(component: &str) -> bool {
    if component.is_empty() {
        return false;
    }
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| alnum(b) || b == b'.' || b == b'_' || b == b'-')
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;
