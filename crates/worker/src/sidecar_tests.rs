// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dh_runtime::fake::tar_file;
use dh_runtime::{FakeRuntime, RuntimeCall};
use tokio_util::sync::CancellationToken;

const SIDECAR: &str = "x/sidecar";
const DIGEST: &str = "sha256:aaaaaaaaaaaabbbbcccc";
const VOLUME: &str = "x-sidecar-aaaaaaaaaaaa";

fn scripted_runtime() -> FakeRuntime {
    let fake = FakeRuntime::new();
    fake.set_image(SIDECAR, "img-1", &[&format!("{SIDECAR}@{DIGEST}")]);
    fake
}

#[tokio::test]
async fn first_use_populates_a_fresh_volume() {
    let fake = scripted_runtime();
    let rootfs = tar_file("agent/entrypoint.sh", b"#!/bin/sh\n");
    fake.set_export(SIDECAR, rootfs.clone());

    let name = ensure_volume(&fake, SIDECAR, &CancellationToken::new()).await.unwrap();
    assert_eq!(name, VOLUME);
    assert_eq!(fake.volume_names(), vec![VOLUME.to_string()]);

    // Exporter first, extractor second.
    let created = fake.created_containers();
    assert_eq!(created.len(), 2);
    let (_, exporter) = &created[0];
    assert_eq!(exporter.image, SIDECAR);
    assert_eq!(exporter.cmd, vec!["true"]);
    assert!(exporter.auto_remove);
    assert!(!exporter.open_stdin);

    let (extractor_id, extractor) = &created[1];
    assert_eq!(extractor.image, SIDECAR);
    assert_eq!(extractor.entrypoint.as_deref(), Some(&["/bin/sh".to_string(), "-c".to_string()][..]));
    assert_eq!(extractor.cmd, vec!["tar -x -C /target"]);
    assert_eq!(extractor.user.as_deref(), Some("root"));
    assert!(extractor.open_stdin);
    assert!(extractor.auto_remove);
    assert_eq!(extractor.binds, vec![format!("{VOLUME}:/target")]);

    // The export stream was piped into the extractor's stdin.
    assert_eq!(fake.stdin_bytes(extractor_id), rootfs);
}

#[tokio::test]
async fn existing_volume_is_reused_without_extraction() {
    let fake = scripted_runtime();
    fake.add_volume(VOLUME);

    let name = ensure_volume(&fake, SIDECAR, &CancellationToken::new()).await.unwrap();
    assert_eq!(name, VOLUME);

    let calls = fake.calls();
    assert!(!calls.iter().any(|c| matches!(c, RuntimeCall::CreateVolume { .. })));
    assert!(!calls.iter().any(|c| matches!(c, RuntimeCall::CreateContainer { .. })));
}

#[tokio::test]
async fn failed_population_removes_the_empty_volume() {
    let fake = scripted_runtime();
    fake.set_wait_code(SIDECAR, 1);
    fake.set_logs(SIDECAR, "tar: corrupt archive");

    let err = ensure_volume(&fake, SIDECAR, &CancellationToken::new()).await.unwrap_err();
    match err {
        SidecarError::Extract { exit_code, logs, .. } => {
            assert_eq!(exit_code, 1);
            assert!(logs.contains("corrupt archive"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The under-populated volume must not be left behind.
    assert!(fake.volume_names().is_empty());
    assert!(fake
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::RemoveVolume { name, force: false } if name == VOLUME)));
}

#[tokio::test]
async fn retry_after_failed_population_repopulates() {
    let fake = scripted_runtime();
    fake.set_wait_code(SIDECAR, 1);
    ensure_volume(&fake, SIDECAR, &CancellationToken::new()).await.unwrap_err();

    fake.set_wait_code(SIDECAR, 0);
    let name = ensure_volume(&fake, SIDECAR, &CancellationToken::new()).await.unwrap();
    assert_eq!(name, VOLUME);
    assert_eq!(fake.volume_names(), vec![VOLUME.to_string()]);

    let creates = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RuntimeCall::CreateVolume { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn registry_digest_is_preferred_over_image_id() {
    let fake = FakeRuntime::new();
    fake.set_image(SIDECAR, "sha256:ffffffffffff0000", &[&format!("{SIDECAR}@{DIGEST}")]);
    let digest = image_digest(&fake, SIDECAR).await.unwrap();
    assert_eq!(digest, DIGEST);
}

#[tokio::test]
async fn image_id_stands_in_for_local_builds() {
    let fake = FakeRuntime::new();
    fake.set_image(SIDECAR, "sha256:ffffffffffff0000", &[]);
    let digest = image_digest(&fake, SIDECAR).await.unwrap();
    assert_eq!(digest, "sha256:ffffffffffff0000");
}

#[tokio::test]
async fn missing_digest_and_id_is_an_error() {
    let fake = FakeRuntime::new();
    fake.set_image(SIDECAR, "", &[]);
    let err = image_digest(&fake, SIDECAR).await.unwrap_err();
    assert!(matches!(err, SidecarError::NoDigest(_)));
}

#[tokio::test]
async fn cancellation_aborts_population() {
    let fake = scripted_runtime();
    fake.set_wait_pending(SIDECAR);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ensure_volume(&fake, SIDECAR, &cancel).await.unwrap_err();
    assert!(matches!(err, SidecarError::Cancelled));
    // The rollback still ran.
    assert!(fake.volume_names().is_empty());
}
