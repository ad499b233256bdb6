// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fake for [`ContainerRuntime`].
//!
//! Every call is appended to a shared log so tests can assert ordering
//! across concurrent executors. Behavior is scripted per image: digests,
//! exit codes, log output, export payloads, and archive contents.

use crate::{
    ContainerRuntime, ContainerSpec, ContainerStdin, ImageInfo, RuntimeError, TarStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Ping,
    ServerPlatform,
    PullImage { image: String, platform: String, authed: bool },
    InspectImage { image: String },
    VolumeExists { name: String },
    CreateVolume { name: String },
    RemoveVolume { name: String, force: bool },
    CreateContainer { id: String, spec: ContainerSpec },
    StartContainer { id: String },
    AttachStdin { id: String },
    WaitContainer { id: String },
    ContainerLogs { id: String },
    ExportContainer { id: String },
    CopyFromContainer { id: String, path: String },
    RemoveContainer { id: String, force: bool },
    Close,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<RuntimeCall>>,
    platform: Mutex<Option<(String, String)>>,
    images: Mutex<HashMap<String, ImageInfo>>,
    pull_errors: Mutex<HashMap<String, String>>,
    volumes: Mutex<HashSet<String>>,
    containers: Mutex<HashMap<String, ContainerSpec>>,
    next_container: AtomicU64,
    wait_codes: Mutex<HashMap<String, i64>>,
    wait_pending: Mutex<HashSet<String>>,
    logs: Mutex<HashMap<String, String>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    exports: Mutex<HashMap<String, Vec<u8>>>,
    stdin: Mutex<HashMap<String, Vec<u8>>>,
}

/// A scriptable, recording container runtime.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the reported daemon platform (default `linux/amd64`).
    pub fn set_platform(&self, os: &str, arch: &str) {
        *self.inner.platform.lock() = Some((os.to_string(), arch.to_string()));
    }

    /// Script an image's inspect result.
    pub fn set_image(&self, image: &str, id: &str, repo_digests: &[&str]) {
        self.inner.images.lock().insert(
            image.to_string(),
            ImageInfo {
                id: id.to_string(),
                repo_digests: repo_digests.iter().map(|d| d.to_string()).collect(),
            },
        );
    }

    /// Make pulls of `image` fail with the given daemon message.
    pub fn set_pull_error(&self, image: &str, message: &str) {
        self.inner.pull_errors.lock().insert(image.to_string(), message.to_string());
    }

    /// Pre-populate a named volume.
    pub fn add_volume(&self, name: &str) {
        self.inner.volumes.lock().insert(name.to_string());
    }

    /// Script the exit code for containers created from `image` (default 0).
    pub fn set_wait_code(&self, image: &str, code: i64) {
        self.inner.wait_codes.lock().insert(image.to_string(), code);
    }

    /// Make waits on containers of `image` block forever, for cancellation
    /// tests.
    pub fn set_wait_pending(&self, image: &str) {
        self.inner.wait_pending.lock().insert(image.to_string());
    }

    /// Script the combined log output for containers created from `image`.
    pub fn set_logs(&self, image: &str, output: &str) {
        self.inner.logs.lock().insert(image.to_string(), output.to_string());
    }

    /// Script the archive returned by `copy_from_container` for a path.
    pub fn set_archive(&self, path: &str, tar: Vec<u8>) {
        self.inner.archives.lock().insert(path.to_string(), tar);
    }

    /// Script the export stream for containers created from `image`.
    pub fn set_export(&self, image: &str, tar: Vec<u8>) {
        self.inner.exports.lock().insert(image.to_string(), tar);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.calls.lock().clone()
    }

    /// Names of volumes that currently exist.
    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.volumes.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// The spec a container was created with, if it still exists.
    pub fn container_spec(&self, id: &str) -> Option<ContainerSpec> {
        self.inner.containers.lock().get(id).cloned()
    }

    /// Creation-ordered `(id, spec)` pairs from the call log.
    pub fn created_containers(&self) -> Vec<(String, ContainerSpec)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::CreateContainer { id, spec } => Some((id, spec)),
                _ => None,
            })
            .collect()
    }

    /// Bytes written to a container's attached stdin.
    pub fn stdin_bytes(&self, id: &str) -> Vec<u8> {
        self.inner.stdin.lock().get(id).cloned().unwrap_or_default()
    }

    fn record(&self, call: RuntimeCall) {
        self.inner.calls.lock().push(call);
    }

    fn image_of(&self, id: &str) -> Result<String, RuntimeError> {
        self.inner
            .containers
            .lock()
            .get(id)
            .map(|spec| spec.image.clone())
            .ok_or_else(|| RuntimeError::Api { status: 404, message: format!("no such container: {id}") })
    }

    /// Deterministic stand-in digest for unscripted images.
    fn synthesize(image: &str) -> ImageInfo {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in image.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let digest = format!("sha256:{:016x}{:016x}{:016x}{:016x}", hash, hash, hash, hash);
        ImageInfo {
            id: digest.clone(),
            repo_digests: vec![format!("{}@{}", image.split(['@', ':']).next().unwrap_or(image), digest)],
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Ping);
        Ok(())
    }

    async fn server_platform(&self) -> Result<(String, String), RuntimeError> {
        self.record(RuntimeCall::ServerPlatform);
        Ok(self
            .inner
            .platform
            .lock()
            .clone()
            .unwrap_or_else(|| ("linux".to_string(), "amd64".to_string())))
    }

    async fn pull_image(
        &self,
        image: &str,
        platform: &str,
        auth: Option<&str>,
    ) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::PullImage {
            image: image.to_string(),
            platform: platform.to_string(),
            authed: auth.is_some(),
        });
        if let Some(message) = self.inner.pull_errors.lock().get(image) {
            return Err(RuntimeError::Api { status: 500, message: message.clone() });
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, RuntimeError> {
        self.record(RuntimeCall::InspectImage { image: image.to_string() });
        let scripted = self.inner.images.lock().get(image).cloned();
        Ok(scripted.unwrap_or_else(|| Self::synthesize(image)))
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        self.record(RuntimeCall::VolumeExists { name: name.to_string() });
        Ok(self.inner.volumes.lock().contains(name))
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::CreateVolume { name: name.to_string() });
        self.inner.volumes.lock().insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveVolume { name: name.to_string(), force });
        if self.inner.volumes.lock().remove(name) {
            Ok(())
        } else {
            Err(RuntimeError::Api { status: 404, message: format!("no such volume: {name}") })
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let id = format!("ctr-{}", self.inner.next_container.fetch_add(1, Ordering::Relaxed) + 1);
        self.record(RuntimeCall::CreateContainer { id: id.clone(), spec: spec.clone() });
        self.inner.containers.lock().insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::StartContainer { id: id.to_string() });
        self.image_of(id)?;
        Ok(())
    }

    async fn attach_stdin(&self, id: &str) -> Result<Box<dyn ContainerStdin>, RuntimeError> {
        self.record(RuntimeCall::AttachStdin { id: id.to_string() });
        self.image_of(id)?;
        Ok(Box::new(FakeStdin { id: id.to_string(), inner: Arc::clone(&self.inner) }))
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        self.record(RuntimeCall::WaitContainer { id: id.to_string() });
        let image = self.image_of(id)?;
        if self.inner.wait_pending.lock().contains(&image) {
            std::future::pending::<()>().await;
        }
        Ok(self.inner.wait_codes.lock().get(&image).copied().unwrap_or(0))
    }

    async fn container_logs(&self, id: &str) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::ContainerLogs { id: id.to_string() });
        let image = self.image_of(id)?;
        Ok(self.inner.logs.lock().get(&image).cloned().unwrap_or_default())
    }

    async fn export_container(&self, id: &str) -> Result<Box<dyn TarStream>, RuntimeError> {
        self.record(RuntimeCall::ExportContainer { id: id.to_string() });
        let image = self.image_of(id)?;
        let bytes = self.inner.exports.lock().get(&image).cloned().unwrap_or_default();
        Ok(Box::new(FakeTarStream { bytes: Some(bytes) }))
    }

    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>, RuntimeError> {
        self.record(RuntimeCall::CopyFromContainer { id: id.to_string(), path: path.to_string() });
        self.image_of(id)?;
        self.inner.archives.lock().get(path).cloned().ok_or_else(|| RuntimeError::Api {
            status: 404,
            message: format!("no such file: {path}"),
        })
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveContainer { id: id.to_string(), force });
        self.inner.containers.lock().remove(id);
        Ok(())
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Close);
        Ok(())
    }
}

struct FakeStdin {
    id: String,
    inner: Arc<Inner>,
}

#[async_trait]
impl ContainerStdin for FakeStdin {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), RuntimeError> {
        self.inner.stdin.lock().entry(self.id.clone()).or_default().extend_from_slice(buf);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct FakeTarStream {
    bytes: Option<Vec<u8>>,
}

#[async_trait]
impl TarStream for FakeTarStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, RuntimeError> {
        match self.bytes.take() {
            Some(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }
}

/// Build a single-file ustar archive, for scripting archive and export
/// payloads in tests.
pub fn tar_file(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 512];
    header[..name.len().min(100)].copy_from_slice(&name.as_bytes()[..name.len().min(100)]);
    header[100..107].copy_from_slice(b"0000644");
    header[108..115].copy_from_slice(b"0000000");
    header[116..123].copy_from_slice(b"0000000");
    let size = format!("{:011o}", contents.len());
    header[124..124 + 11].copy_from_slice(size.as_bytes());
    header[136..147].copy_from_slice(b"00000000000");
    header[156] = b'0';
    header[257..262].copy_from_slice(b"ustar");
    header[263..265].copy_from_slice(b"00");

    // Checksum is computed with the checksum field itself set to spaces.
    header[148..156].copy_from_slice(b"        ");
    let sum: u32 = header.iter().map(|&b| u32::from(b)).sum();
    let checksum = format!("{:06o}\0 ", sum);
    header[148..156].copy_from_slice(checksum.as_bytes());

    let mut out = Vec::with_capacity(1024 + contents.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(contents);
    let padding = (512 - contents.len() % 512) % 512;
    out.extend(std::iter::repeat(0u8).take(padding));
    out.extend_from_slice(&[0u8; 1024]);
    out
}
