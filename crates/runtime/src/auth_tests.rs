// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use std::path::Path;

fn write_config(dir: &Path, body: &str) {
    std::fs::write(dir.join("config.json"), body).unwrap();
}

fn decode_blob(blob: &str) -> serde_json::Value {
    let bytes = URL_SAFE.decode(blob).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn combined_auth_field_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let auth = STANDARD.encode("alice:s3cret");
    write_config(dir.path(), &format!(r#"{{"auths":{{"ghcr.io":{{"auth":"{auth}"}}}}}}"#));

    let blob = resolve_from(dir.path(), "ghcr.io/acme/agent:v3").unwrap();
    let value = decode_blob(&blob);
    assert_eq!(value["username"], "alice");
    assert_eq!(value["password"], "s3cret");
    assert_eq!(value["serveraddress"], "ghcr.io");
}

#[test]
fn split_fields_resolve() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"{"auths":{"localhost:5000":{"username":"bob","password":"pw"}}}"#,
    );

    let blob = resolve_from(dir.path(), "localhost:5000/team/tool").unwrap();
    let value = decode_blob(&blob);
    assert_eq!(value["username"], "bob");
    assert_eq!(value["serveraddress"], "localhost:5000");
}

#[test]
fn hub_images_use_legacy_index_key() {
    let dir = tempfile::tempdir().unwrap();
    let auth = STANDARD.encode("carol:hub-pw");
    write_config(
        dir.path(),
        &format!(r#"{{"auths":{{"https://index.docker.io/v1/":{{"auth":"{auth}"}}}}}}"#),
    );

    let blob = resolve_from(dir.path(), "ubuntu:22.04").unwrap();
    assert_eq!(decode_blob(&blob)["username"], "carol");
}

#[test]
fn scheme_variants_match() {
    let dir = tempfile::tempdir().unwrap();
    let auth = STANDARD.encode("dave:pw");
    write_config(dir.path(), &format!(r#"{{"auths":{{"https://ghcr.io/":{{"auth":"{auth}"}}}}}}"#));

    assert!(resolve_from(dir.path(), "ghcr.io/acme/agent").is_some());
}

#[test]
fn missing_config_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(resolve_from(dir.path(), "ghcr.io/acme/agent"), None);
}

#[test]
fn unknown_registry_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), r#"{"auths":{"ghcr.io":{"username":"x","password":"y"}}}"#);
    assert_eq!(resolve_from(dir.path(), "quay.io/acme/agent"), None);
}

#[test]
fn corrupt_config_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "{not json");
    assert_eq!(resolve_from(dir.path(), "ghcr.io/acme/agent"), None);
}

#[test]
fn empty_username_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), r#"{"auths":{"ghcr.io":{"username":"","password":"y"}}}"#);
    assert_eq!(resolve_from(dir.path(), "ghcr.io/acme/agent"), None);
}

#[test]
fn unparseable_image_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), r#"{"auths":{"ghcr.io":{"username":"x","password":"y"}}}"#);
    assert_eq!(resolve_from(dir.path(), "Not A Ref"), None);
}
