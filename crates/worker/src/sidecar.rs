// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sidecar volume cache.
//!
//! A sidecar image's rootfs is extracted once into a named volume keyed by
//! `(repository, digest)`; every later task mounts the volume instead of
//! paying for re-extraction. Reuse needs no verification: different content
//! has a different digest and therefore a different volume name.
//!
//! Population uses the sidecar image itself as the extraction tool, which
//! avoids a separate extractor image dependency and keeps producer and
//! extractor on the same architecture: a throwaway container of the image is
//! exported as a TAR stream and piped into `tar -x` running in a second
//! container of the same image with the volume bound at `/target`.

use dh_runtime::{ContainerRuntime, ContainerSpec, RuntimeError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the volume is bound inside the extraction container.
const EXTRACT_TARGET: &str = "/target";

/// Errors from volume cache operations.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("failed to get image digest for {image}: {source}")]
    Digest {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("no digest found for image {0}")]
    NoDigest(String),
    #[error("failed to inspect volume {name}: {source}")]
    Inspect {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to create volume {name}: {source}")]
    CreateVolume {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to copy sidecar {image} to volume: {source}")]
    Populate {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("extraction container for {image} exited with status {exit_code}. Logs: {logs}")]
    Extract { image: String, exit_code: i64, logs: String },
    #[error("task cancelled")]
    Cancelled,
}

/// Resolve the digest that content-addresses an image.
///
/// Prefers the registry digest; locally built images carry none, so the
/// image id stands in for them.
pub async fn image_digest(
    runtime: &dyn ContainerRuntime,
    image: &str,
) -> Result<String, SidecarError> {
    let info = runtime
        .inspect_image(image)
        .await
        .map_err(|source| SidecarError::Digest { image: image.to_string(), source })?;

    if let Some(repo_digest) = info.repo_digests.first() {
        // RepoDigests entries are `repo@algo:hex`.
        let parts: Vec<&str> = repo_digest.split('@').collect();
        if parts.len() == 2 {
            return Ok(parts[1].to_string());
        }
    }
    if !info.id.is_empty() {
        return Ok(info.id);
    }
    Err(SidecarError::NoDigest(image.to_string()))
}

/// Return the name of a populated volume for `image`, minting and populating
/// it on first use.
///
/// A concurrent first use of the same image is a tolerated race: both
/// writers extract identical bytes into the same volume, so the final state
/// is the same whichever wins.
pub async fn ensure_volume(
    runtime: &dyn ContainerRuntime,
    image: &str,
    cancel: &CancellationToken,
) -> Result<String, SidecarError> {
    let digest = image_digest(runtime, image).await?;
    let name = dh_core::volume_name(image, &digest);
    debug!(volume = %name, image, "using shared volume");

    let exists = runtime
        .volume_exists(&name)
        .await
        .map_err(|source| SidecarError::Inspect { name: name.clone(), source })?;
    if exists {
        debug!(volume = %name, "reusing existing volume (already populated from sidecar)");
        return Ok(name);
    }

    info!(volume = %name, "creating new volume");
    runtime
        .create_volume(&name)
        .await
        .map_err(|source| SidecarError::CreateVolume { name: name.clone(), source })?;

    debug!(volume = %name, "copying sidecar filesystem to volume (first use)");
    if let Err(e) = populate(runtime, image, &name, cancel).await {
        // Remove the empty volume so a retry does not silently reuse an
        // under-populated one.
        if let Err(remove_err) = runtime.remove_volume(&name, false).await {
            warn!(volume = %name, error = %remove_err, "failed to clean up volume after populate failure");
        }
        return Err(e);
    }

    Ok(name)
}

/// Extract `image`'s rootfs into the named volume.
async fn populate(
    runtime: &dyn ContainerRuntime,
    image: &str,
    volume: &str,
    cancel: &CancellationToken,
) -> Result<(), SidecarError> {
    let populate_err =
        |source: RuntimeError| SidecarError::Populate { image: image.to_string(), source };

    // A never-started container whose only purpose is an exportable
    // filesystem snapshot.
    info!(image, "creating temporary container from sidecar image");
    let exporter = runtime
        .create_container(&ContainerSpec {
            image: image.to_string(),
            cmd: vec!["true".to_string()],
            auto_remove: true,
            ..ContainerSpec::default()
        })
        .await
        .map_err(populate_err)?;
    info!(container = %exporter, "created export container");

    let mut export = runtime.export_container(&exporter).await.map_err(populate_err)?;

    // The image extracts itself: entrypoint overridden so only tar runs,
    // as root so the volume is writable.
    info!(volume, "extracting sidecar filesystem to volume");
    let extractor = runtime
        .create_container(&ContainerSpec {
            image: image.to_string(),
            user: Some("root".to_string()),
            entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            cmd: vec![format!("tar -x -C {}", EXTRACT_TARGET)],
            open_stdin: true,
            auto_remove: true,
            binds: vec![format!("{}:{}", volume, EXTRACT_TARGET)],
            ..ContainerSpec::default()
        })
        .await
        .map_err(populate_err)?;
    info!(container = %extractor, "created extraction container");

    let mut stdin = runtime.attach_stdin(&extractor).await.map_err(populate_err)?;
    runtime.start_container(&extractor).await.map_err(populate_err)?;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
            chunk = export.next_chunk() => chunk.map_err(populate_err)?,
        };
        match chunk {
            Some(bytes) => stdin.write_all(&bytes).await.map_err(populate_err)?,
            None => break,
        }
    }
    stdin.close().await.map_err(populate_err)?;

    let exit_code = tokio::select! {
        _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
        status = runtime.wait_container(&extractor) => status.map_err(populate_err)?,
    };
    if exit_code != 0 {
        let logs = runtime.container_logs(&extractor).await.unwrap_or_default();
        return Err(SidecarError::Extract { image: image.to_string(), exit_code, logs });
    }

    info!(volume, "successfully extracted sidecar filesystem to volume");
    Ok(())
}

#[cfg(test)]
#[path = "sidecar_tests.rs"]
mod tests;
