// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::first_regular_file;
use crate::fake::tar_file;

#[test]
fn reads_single_file_archive() {
    let archive = tar_file("agent_output.txt", b"HELLO\n");
    assert_eq!(first_regular_file(&archive), Some(b"HELLO\n".to_vec()));
}

#[test]
fn reads_file_larger_than_one_block() {
    let contents = vec![b'x'; 1500];
    let archive = tar_file("big.txt", &contents);
    assert_eq!(first_regular_file(&archive), Some(contents));
}

#[test]
fn empty_file_yields_empty_contents() {
    let archive = tar_file("empty.txt", b"");
    assert_eq!(first_regular_file(&archive), Some(Vec::new()));
}

#[test]
fn empty_archive_yields_none() {
    assert_eq!(first_regular_file(&[0u8; 1024]), None);
    assert_eq!(first_regular_file(b""), None);
}

#[test]
fn garbage_input_yields_none() {
    // A text payload has no valid octal size field at offset 124.
    let mut garbage = vec![b'a'; 2048];
    garbage[124..136].copy_from_slice(b"not an octal");
    assert_eq!(first_regular_file(&garbage), None);
}
