// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{decode, TaskAssignment, TASK_ASSIGNMENT};

#[test]
fn full_assignment_decodes() {
    let frame = r#"{
        "type": "task-assignment",
        "data": {
            "task_id": "task-1",
            "task": {
                "id": "task-1",
                "title": "Fix the flaky test",
                "agent_config_snapshot": { "environment_id": "env-9" },
                "args": ["--branch", "main"]
            },
            "docker_image": "ghcr.io/acme/dev:latest",
            "sidecar_image": "acme/agent-payload:v3",
            "additional_sidecars": [
                { "image": "acme/xvfb", "mount_path": "/xvfb", "read_write": true }
            ],
            "env_vars": { "FOO": "bar" }
        }
    }"#;

    let envelope = decode(frame).unwrap();
    assert_eq!(envelope.kind, TASK_ASSIGNMENT);

    let assignment: TaskAssignment = envelope.payload().unwrap();
    assert_eq!(assignment.task_id, "task-1");
    assert_eq!(assignment.task.title, "Fix the flaky test");
    assert_eq!(assignment.task.agent_config_snapshot.environment_id.as_deref(), Some("env-9"));
    assert_eq!(assignment.task.args, vec!["--branch", "main"]);
    assert_eq!(assignment.docker_image, "ghcr.io/acme/dev:latest");
    assert_eq!(assignment.sidecar_image, "acme/agent-payload:v3");
    assert_eq!(assignment.additional_sidecars.len(), 1);
    assert!(assignment.additional_sidecars[0].read_write);
    assert_eq!(assignment.env_vars.get("FOO").map(String::as_str), Some("bar"));
}

#[test]
fn minimal_assignment_uses_defaults() {
    let frame = r#"{
        "type": "task-assignment",
        "data": {
            "task_id": "task-2",
            "task": { "id": "task-2" },
            "sidecar_image": "x/sidecar"
        }
    }"#;

    let assignment: TaskAssignment = decode(frame).unwrap().payload().unwrap();
    assert_eq!(assignment.docker_image, "");
    assert!(assignment.task.title.is_empty());
    assert!(assignment.task.agent_config_snapshot.environment_id.is_none());
    assert!(assignment.task.args.is_empty());
    assert!(assignment.additional_sidecars.is_empty());
    assert!(assignment.env_vars.is_empty());
}

#[test]
fn unknown_type_keeps_its_name() {
    let envelope = decode(r#"{"type": "task-revoked", "data": {}}"#).unwrap();
    assert_eq!(envelope.kind, "task-revoked");
}

#[test]
fn malformed_json_is_an_error() {
    assert!(decode("{not json").is_err());
}

#[test]
fn wrong_payload_shape_is_an_error() {
    let envelope = decode(r#"{"type": "task-assignment", "data": {"task_id": 7}}"#).unwrap();
    assert!(envelope.payload::<TaskAssignment>().is_err());
}
