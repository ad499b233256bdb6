// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed volume naming.
//!
//! A sidecar volume is keyed by `(repository, digest)`: the repository's
//! familiar path with slashes flattened, joined to the first 12 hex
//! characters of the image digest. Equal inputs always produce equal names,
//! and a content change (new digest) produces a new name, so a volume found
//! by name can be reused without inspecting its contents.

use crate::reference;

/// Number of digest characters carried in the volume name.
const DIGEST_PREFIX_LEN: usize = 12;

/// Derive the volume name for an image and its resolved digest.
///
/// Falls back to the raw reference string when the image fails to parse,
/// and to a `:`-flattened digest when the digest is not in `algo:hex` form.
/// Both fallbacks keep the name deterministic for the same inputs.
pub fn volume_name(image: &str, digest: &str) -> String {
    let repo = match reference::parse(image) {
        Ok(r) => r.familiar_path().to_string(),
        Err(_) => image.to_string(),
    };
    let base = repo.replace('/', "-");

    let parts: Vec<&str> = digest.split(':').collect();
    if parts.len() == 2 && !parts[1].is_empty() {
        let hash = parts[1].get(..DIGEST_PREFIX_LEN).unwrap_or(parts[1]);
        format!("{}-{}", base, hash)
    } else {
        format!("{}-{}", base, digest.replace(':', "-"))
    }
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
