// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry credential resolution from the user's container config.
//!
//! Pulls are authenticated with the daemon's `X-Registry-Auth` header: a
//! base64-url-encoded JSON credential blob. Credentials come from the same
//! `config.json` the docker CLI writes (`docker login`); any failure along
//! the way resolves to `None` and the pull proceeds unauthenticated.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Deserialize)]
struct ContainerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Deserialize)]
struct AuthEntry {
    /// Combined `base64(username:password)` written by `docker login`.
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Resolve the auth blob for an image's registry from the default config
/// location (`$DOCKER_CONFIG`, else `~/.docker`).
pub fn resolve(image: &str) -> Option<String> {
    let dir = match std::env::var("DOCKER_CONFIG") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()?.join(".docker"),
    };
    resolve_from(&dir, image)
}

/// Resolve the auth blob for an image's registry from a specific config
/// directory.
pub fn resolve_from(config_dir: &Path, image: &str) -> Option<String> {
    let path = config_dir.join("config.json");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no container config; pulling without auth");
            return None;
        }
    };
    let config: ContainerConfig = match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable container config; pulling without auth");
            return None;
        }
    };

    let reference = match dh_core::reference::parse(image) {
        Ok(reference) => reference,
        Err(e) => {
            warn!(image, error = %e, "unparseable image reference; pulling without auth");
            return None;
        }
    };
    let auth_key = reference.registry_auth_key();

    let entry = lookup(&config.auths, auth_key)?;
    let (username, password) = credentials(entry)?;
    if username.is_empty() {
        return None;
    }

    debug!(registry = auth_key, username = %username, "using registry credentials");
    let blob = serde_json::json!({
        "username": username,
        "password": password,
        "serveraddress": auth_key,
    });
    Some(URL_SAFE.encode(blob.to_string()))
}

/// Find the entry whose key names the same registry, tolerating the scheme
/// and trailing-slash variants different tools write.
fn lookup<'a>(auths: &'a HashMap<String, AuthEntry>, key: &str) -> Option<&'a AuthEntry> {
    if let Some(entry) = auths.get(key) {
        return Some(entry);
    }
    let wanted = normalize_key(key);
    auths.iter().find(|(k, _)| normalize_key(k) == wanted).map(|(_, v)| v)
}

fn normalize_key(key: &str) -> &str {
    let key = key.strip_prefix("https://").or_else(|| key.strip_prefix("http://")).unwrap_or(key);
    key.trim_end_matches('/')
}

/// Extract `(username, password)` from an entry, preferring the combined
/// `auth` field.
fn credentials(entry: &AuthEntry) -> Option<(String, String)> {
    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = STANDARD.decode(auth).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        return Some((username.to_string(), password.to_string()));
    }
    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        _ => None,
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
