// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bare_name_normalizes_to_hub_library() {
    let r = parse("ubuntu").unwrap();
    assert_eq!(r.domain(), "docker.io");
    assert_eq!(r.path(), "library/ubuntu");
    assert_eq!(r.familiar_path(), "ubuntu");
    assert_eq!(r.tag(), None);
}

#[test]
fn bare_name_with_tag() {
    let r = parse("ubuntu:22.04").unwrap();
    assert_eq!(r.path(), "library/ubuntu");
    assert_eq!(r.tag(), Some("22.04"));
    assert_eq!(r.familiar_path(), "ubuntu");
}

#[test]
fn namespaced_hub_reference_keeps_namespace() {
    let r = parse("acme/agent:latest").unwrap();
    assert_eq!(r.domain(), "docker.io");
    assert_eq!(r.path(), "acme/agent");
    assert_eq!(r.familiar_path(), "acme/agent");
}

#[test]
fn explicit_domain_is_detected_by_dot() {
    let r = parse("ghcr.io/acme/agent:v3").unwrap();
    assert_eq!(r.domain(), "ghcr.io");
    assert_eq!(r.path(), "acme/agent");
    assert_eq!(r.familiar_path(), "acme/agent");
    assert_eq!(r.tag(), Some("v3"));
}

#[test]
fn localhost_registry_with_port() {
    let r = parse("localhost:5000/team/tool").unwrap();
    assert_eq!(r.domain(), "localhost:5000");
    assert_eq!(r.path(), "team/tool");
}

#[test]
fn digest_reference_parses() {
    let r = parse("x/sidecar@sha256:aaaabbbb").unwrap();
    assert_eq!(r.familiar_path(), "x/sidecar");
    assert_eq!(r.digest(), Some("sha256:aaaabbbb"));
    assert_eq!(r.tag(), None);
}

#[test]
fn tag_and_digest_together() {
    let r = parse("ghcr.io/acme/agent:v3@sha256:abcd").unwrap();
    assert_eq!(r.tag(), Some("v3"));
    assert_eq!(r.digest(), Some("sha256:abcd"));
}

#[test]
fn hub_auth_key_is_legacy_index() {
    assert_eq!(parse("ubuntu").unwrap().registry_auth_key(), "https://index.docker.io/v1/");
    assert_eq!(parse("ghcr.io/a/b").unwrap().registry_auth_key(), "ghcr.io");
    assert_eq!(parse("localhost:5000/a/b").unwrap().registry_auth_key(), "localhost:5000");
}

#[test]
fn rejects_empty_and_whitespace() {
    assert_eq!(parse(""), Err(ReferenceError::Empty));
    assert_eq!(parse("   "), Err(ReferenceError::Empty));
    assert!(matches!(parse("a b"), Err(ReferenceError::InvalidName(_))));
}

#[test]
fn rejects_uppercase_repository() {
    assert!(matches!(parse("Ubuntu"), Err(ReferenceError::InvalidName(_))));
    assert!(matches!(parse("acme/Agent"), Err(ReferenceError::InvalidName(_))));
}

#[test]
fn rejects_malformed_separators() {
    assert!(matches!(parse("acme//agent"), Err(ReferenceError::InvalidName(_))));
    assert!(matches!(parse("-agent"), Err(ReferenceError::InvalidName(_))));
    assert!(matches!(parse("agent:"), Err(ReferenceError::InvalidName(_))));
    assert!(matches!(parse("agent@"), Err(ReferenceError::InvalidName(_))));
}
