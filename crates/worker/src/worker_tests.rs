// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dh_runtime::{FakeRuntime, RuntimeCall};

fn config() -> WorkerConfig {
    WorkerConfig {
        api_key: "key".to_string(),
        worker_id: "worker-a".into(),
        channel_url: "ws://localhost:8080/ws".to_string(),
        server_root_url: "http://localhost:8080".to_string(),
        log_level: "info".to_string(),
        no_cleanup: false,
        volumes: Vec::new(),
    }
}

#[tokio::test]
async fn construction_probes_the_daemon() {
    let fake = FakeRuntime::new();
    let worker = Worker::with_runtime(config(), Arc::new(fake.clone())).await.unwrap();
    assert_eq!(worker.handle().active_tasks(), 0);

    let calls = fake.calls();
    assert_eq!(calls[0], RuntimeCall::Ping);
    assert_eq!(calls[1], RuntimeCall::ServerPlatform);
}

#[tokio::test]
async fn arm64_daemons_are_supported() {
    let fake = FakeRuntime::new();
    fake.set_platform("linux", "arm64");
    assert!(Worker::with_runtime(config(), Arc::new(fake)).await.is_ok());
}

#[tokio::test]
async fn unsupported_platform_fails_construction() {
    let fake = FakeRuntime::new();
    fake.set_platform("linux", "riscv64");

    let err = Worker::with_runtime(config(), Arc::new(fake.clone())).await.unwrap_err();
    match err {
        WorkerError::UnsupportedPlatform(platform) => assert_eq!(platform, "linux/riscv64"),
        other => panic!("unexpected error: {other}"),
    }
    // The probe client is released on the failure path.
    assert!(fake.calls().contains(&RuntimeCall::Close));
}

#[tokio::test]
async fn shutdown_closes_the_runtime_client() {
    let fake = FakeRuntime::new();
    let worker = Worker::with_runtime(config(), Arc::new(fake.clone())).await.unwrap();
    worker.handle().shutdown().await;
    assert!(fake.calls().contains(&RuntimeCall::Close));
}
