// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demultiplexer for the daemon's log stream format.
//!
//! Containers started without a TTY get their stdout and stderr multiplexed
//! into one stream of frames: an 8-byte header (stream id, three zero bytes,
//! big-endian payload length) followed by the payload. Frames are interleaved
//! in arrival order, so concatenating payloads reproduces the combined
//! output.

/// Combine a multiplexed log stream into one string, stdout and stderr in
/// arrival order. Input that does not follow the frame format (a TTY
/// container's raw stream) is passed through unchanged.
pub fn demux_logs(data: &[u8]) -> String {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < 8 || rest[0] > 2 || rest[1] != 0 || rest[2] != 0 || rest[3] != 0 {
            return String::from_utf8_lossy(data).into_owned();
        }
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        if rest.len() < 8 + len {
            return String::from_utf8_lossy(data).into_owned();
        }
        out.extend_from_slice(&rest[8..8 + len]);
        rest = &rest[8 + len..];
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
