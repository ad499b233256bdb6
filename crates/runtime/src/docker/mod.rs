// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker Engine implementation of [`ContainerRuntime`].
//!
//! Talks to the daemon over its Unix socket (`DOCKER_HOST` with a `unix://`
//! scheme overrides the platform default). Each call opens one connection;
//! the daemon itself is safe for concurrent use, so so is this client.

mod http;
pub mod stream;

use crate::{
    ContainerRuntime, ContainerSpec, ContainerStdin, ImageInfo, RuntimeError, TarStream,
};
use async_trait::async_trait;
use self::http::{query_escape, HttpClient, Response};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

/// Platform-native daemon socket.
const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

pub struct DockerRuntime {
    client: HttpClient,
}

impl DockerRuntime {
    /// Connect configuration from the environment: honors a `unix://`
    /// `DOCKER_HOST`, otherwise uses the platform default socket. Other
    /// schemes are rejected; this worker only speaks the local daemon.
    pub fn from_env() -> Result<Self, RuntimeError> {
        let socket = match std::env::var("DOCKER_HOST") {
            Ok(host) => match host.strip_prefix("unix://") {
                Some(path) if !path.is_empty() => PathBuf::from(path),
                _ => return Err(RuntimeError::UnsupportedEndpoint(host)),
            },
            Err(_) => PathBuf::from(DEFAULT_SOCKET),
        };
        Ok(Self { client: HttpClient::new(socket) })
    }

    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self { client: HttpClient::new(path) }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        self.client.socket_path()
    }

    async fn expect_success(response: Response) -> Result<Response, RuntimeError> {
        if response.status >= 400 {
            return Err(response.into_api_error().await);
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct VersionBody {
    #[serde(rename = "Os")]
    os: String,
    #[serde(rename = "Arch")]
    arch: String,
}

#[derive(Deserialize)]
struct ImageInspectBody {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "RepoDigests", default)]
    repo_digests: Vec<String>,
}

#[derive(Deserialize)]
struct CreateBody {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct WaitBody {
    #[serde(rename = "StatusCode")]
    status_code: i64,
    #[serde(rename = "Error")]
    error: Option<WaitError>,
}

#[derive(Deserialize)]
struct WaitError {
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let response = self.client.request("GET", "/_ping", &[], None).await?;
        Self::expect_success(response).await?.drain().await
    }

    async fn server_platform(&self) -> Result<(String, String), RuntimeError> {
        let response = self.client.request("GET", "/version", &[], None).await?;
        let body = Self::expect_success(response).await?.read_to_string().await?;
        let version: VersionBody =
            serde_json::from_str(&body).map_err(|e| RuntimeError::Decode(e.to_string()))?;
        Ok((version.os, version.arch))
    }

    async fn pull_image(
        &self,
        image: &str,
        platform: &str,
        auth: Option<&str>,
    ) -> Result<(), RuntimeError> {
        let path = format!(
            "/images/create?fromImage={}&platform={}",
            query_escape(image),
            query_escape(platform)
        );
        let mut headers = Vec::new();
        if let Some(auth) = auth {
            headers.push(("X-Registry-Auth", auth.to_string()));
        }
        let response = self.client.request("POST", &path, &headers, None).await?;
        // The pull happens while the progress stream is consumed; the
        // content is not interesting here.
        Self::expect_success(response).await?.drain().await
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, RuntimeError> {
        let path = format!("/images/{}/json", image);
        let response = self.client.request("GET", &path, &[], None).await?;
        let body = Self::expect_success(response).await?.read_to_string().await?;
        let inspect: ImageInspectBody =
            serde_json::from_str(&body).map_err(|e| RuntimeError::Decode(e.to_string()))?;
        Ok(ImageInfo { id: inspect.id, repo_digests: inspect.repo_digests })
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        let path = format!("/volumes/{}", query_escape(name));
        let response = self.client.request("GET", &path, &[], None).await?;
        if response.status == 404 {
            response.drain().await?;
            return Ok(false);
        }
        Self::expect_success(response).await?.drain().await?;
        Ok(true)
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let body = serde_json::json!({ "Name": name }).to_string();
        let response =
            self.client.request("POST", "/volumes/create", &[], Some(body.as_bytes())).await?;
        Self::expect_success(response).await?.drain().await
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let path = format!("/volumes/{}?force={}", query_escape(name), force);
        let response = self.client.request("DELETE", &path, &[], None).await?;
        Self::expect_success(response).await?.drain().await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut config = serde_json::json!({
            "Image": spec.image,
            "Cmd": spec.cmd,
            "Env": spec.env,
            "HostConfig": {
                "Binds": spec.binds,
                "AutoRemove": spec.auto_remove,
            },
        });
        if let Some(entrypoint) = &spec.entrypoint {
            config["Entrypoint"] = serde_json::json!(entrypoint);
        }
        if let Some(dir) = &spec.working_dir {
            config["WorkingDir"] = serde_json::json!(dir);
        }
        if let Some(user) = &spec.user {
            config["User"] = serde_json::json!(user);
        }
        if spec.open_stdin {
            config["OpenStdin"] = serde_json::json!(true);
            config["StdinOnce"] = serde_json::json!(true);
            config["AttachStdin"] = serde_json::json!(true);
            config["AttachStdout"] = serde_json::json!(true);
            config["AttachStderr"] = serde_json::json!(true);
        }

        let body = config.to_string();
        let response =
            self.client.request("POST", "/containers/create", &[], Some(body.as_bytes())).await?;
        let body = Self::expect_success(response).await?.read_to_string().await?;
        let created: CreateBody =
            serde_json::from_str(&body).map_err(|e| RuntimeError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}/start", id);
        let response = self.client.request("POST", &path, &[], None).await?;
        Self::expect_success(response).await?.drain().await
    }

    async fn attach_stdin(&self, id: &str) -> Result<Box<dyn ContainerStdin>, RuntimeError> {
        let path = format!("/containers/{}/attach?stream=1&stdin=1", id);
        let stream = self.client.upgrade("POST", &path).await?;
        Ok(Box::new(AttachedStdin { stream }))
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let path = format!("/containers/{}/wait?condition=not-running", id);
        let response = self.client.request("POST", &path, &[], None).await?;
        let body = Self::expect_success(response).await?.read_to_string().await?;
        let wait: WaitBody =
            serde_json::from_str(&body).map_err(|e| RuntimeError::Decode(e.to_string()))?;
        if let Some(error) = wait.error {
            if let Some(message) = error.message {
                if !message.is_empty() {
                    return Err(RuntimeError::Wait(message));
                }
            }
        }
        Ok(wait.status_code)
    }

    async fn container_logs(&self, id: &str) -> Result<String, RuntimeError> {
        let path = format!("/containers/{}/logs?stdout=1&stderr=1&timestamps=0", id);
        let response = self.client.request("GET", &path, &[], None).await?;
        let bytes = Self::expect_success(response).await?.read_to_end().await?;
        Ok(stream::demux_logs(&bytes))
    }

    async fn export_container(&self, id: &str) -> Result<Box<dyn TarStream>, RuntimeError> {
        let path = format!("/containers/{}/export", id);
        let response = self.client.request("GET", &path, &[], None).await?;
        let response = Self::expect_success(response).await?;
        Ok(Box::new(ExportStream { response }))
    }

    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let path = format!("/containers/{}/archive?path={}", id, query_escape(path));
        let response = self.client.request("GET", &path, &[], None).await?;
        Self::expect_success(response).await?.read_to_end().await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}?force={}", id, force);
        let response = self.client.request("DELETE", &path, &[], None).await?;
        if response.status == 404 {
            // Already gone (auto-removed); nothing to do.
            debug!(container = id, "remove: container already gone");
            return response.drain().await;
        }
        Self::expect_success(response).await?.drain().await
    }
}

struct ExportStream {
    response: Response,
}

#[async_trait]
impl TarStream for ExportStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, RuntimeError> {
        self.response.next_chunk().await
    }
}

struct AttachedStdin {
    stream: UnixStream,
}

#[async_trait]
impl ContainerStdin for AttachedStdin {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), RuntimeError> {
        self.stream.write_all(buf).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
