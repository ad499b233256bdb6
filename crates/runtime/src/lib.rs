// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dh-runtime: container runtime adapter.
//!
//! The worker drives containers exclusively through the [`ContainerRuntime`]
//! trait; the only production implementation talks to the platform Docker
//! daemon over its Unix socket. Tests use the recording [`FakeRuntime`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod archive;
pub mod auth;
pub mod docker;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntime, RuntimeCall};

pub use docker::DockerRuntime;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from container runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to container daemon: {0}")]
    Connect(#[source] std::io::Error),
    #[error("daemon i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("daemon returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed daemon response: {0}")]
    Decode(String),
    #[error("unsupported daemon endpoint: {0}")]
    UnsupportedEndpoint(String),
    #[error("container wait failed: {0}")]
    Wait(String),
}

impl RuntimeError {
    /// True for plain not-found answers (missing volume, missing path).
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::Api { status: 404, .. })
    }
}

/// Creation parameters for a container.
///
/// `open_stdin` switches the container to piped-stdin mode: stdin is kept
/// open, attached, and closed after the first detach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    pub entrypoint: Option<Vec<String>>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub binds: Vec<String>,
    pub auto_remove: bool,
    pub open_stdin: bool,
}

/// Inspection result for a local image.
#[derive(Debug, Clone, Default)]
pub struct ImageInfo {
    pub id: String,
    /// Registry digests in `repo@algo:hex` form; empty for local-only builds.
    pub repo_digests: Vec<String>,
}

/// Incremental reader over a TAR byte stream.
#[async_trait]
pub trait TarStream: Send {
    /// Next run of bytes, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, RuntimeError>;
}

/// Write half of an attached container's stdin.
#[async_trait]
pub trait ContainerStdin: Send {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), RuntimeError>;
    /// Half-close so the container sees EOF on stdin.
    async fn close(&mut self) -> Result<(), RuntimeError>;
}

/// Abstract interface over the container daemon.
///
/// Implementations are safe for concurrent use; the worker issues calls from
/// many task executors at once.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Daemon platform as `(os, arch)`, e.g. `("linux", "amd64")`.
    async fn server_platform(&self) -> Result<(String, String), RuntimeError>;

    /// Pull an image for the given platform. `auth` is the base64-url
    /// credential blob produced by [`auth::resolve`], absent for
    /// unauthenticated pulls. Layers already present locally are skipped by
    /// the daemon.
    async fn pull_image(
        &self,
        image: &str,
        platform: &str,
        auth: Option<&str>,
    ) -> Result<(), RuntimeError>;

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, RuntimeError>;

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), RuntimeError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Attach to a container created with `open_stdin` and return the write
    /// half of its stdin.
    async fn attach_stdin(&self, id: &str) -> Result<Box<dyn ContainerStdin>, RuntimeError>;

    /// Block until the container is no longer running; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    /// Combined stdout+stderr, demultiplexed, without timestamps.
    async fn container_logs(&self, id: &str) -> Result<String, RuntimeError>;

    /// Stream the container's full filesystem as a TAR archive.
    async fn export_container(&self, id: &str) -> Result<Box<dyn TarStream>, RuntimeError>;

    /// Fetch a path from the container filesystem as a TAR archive.
    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>, RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// Release client resources. The Docker implementation holds no pooled
    /// connections, so this is a no-op there.
    async fn close(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
