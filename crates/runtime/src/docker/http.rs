// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client for the Docker Engine API over a Unix socket.
//!
//! One connection per request. Responses are framed by Content-Length or
//! chunked transfer encoding and can be consumed incrementally, which is how
//! the export and log streams avoid buffering whole filesystems. Attach uses
//! an `Upgrade: tcp` handshake after which the socket is a raw byte stream.

use crate::RuntimeError;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

const READ_BUF: usize = 64 * 1024;

pub(crate) struct HttpClient {
    socket_path: PathBuf,
}

impl HttpClient {
    pub(crate) fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub(crate) fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Issue a request and return the response with its body unread.
    pub(crate) async fn request(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &[(&str, String)],
        body: Option<&[u8]>,
    ) -> Result<Response, RuntimeError> {
        let mut stream =
            UnixStream::connect(&self.socket_path).await.map_err(RuntimeError::Connect)?;

        let mut request = format!("{} {} HTTP/1.1\r\nHost: docker\r\nConnection: close\r\n", method, path_and_query);
        for (name, value) in headers {
            request.push_str(name);
            request.push_str(": ");
            request.push_str(value);
            request.push_str("\r\n");
        }
        if let Some(body) = body {
            request.push_str("Content-Type: application/json\r\n");
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        request.push_str("\r\n");

        stream.write_all(request.as_bytes()).await?;
        if let Some(body) = body {
            stream.write_all(body).await?;
        }

        let mut reader = BufReader::new(stream);
        let head = read_head(&mut reader).await?;
        Ok(Response::new(head, reader))
    }

    /// Issue an upgrade request and hand back the raw stream once the daemon
    /// switches protocols. Only the write direction is used by callers.
    pub(crate) async fn upgrade(
        &self,
        method: &str,
        path_and_query: &str,
    ) -> Result<UnixStream, RuntimeError> {
        let mut stream =
            UnixStream::connect(&self.socket_path).await.map_err(RuntimeError::Connect)?;

        let request = format!(
            "{} {} HTTP/1.1\r\nHost: docker\r\nUpgrade: tcp\r\nConnection: Upgrade\r\n\r\n",
            method, path_and_query
        );
        stream.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let head = read_head(&mut reader).await?;
        // Daemons answer 101 Switching Protocols; very old ones answered 200.
        if head.status != 101 && head.status != 200 {
            let response = Response::new(head, reader);
            return Err(response.into_api_error().await);
        }
        Ok(reader.into_inner())
    }
}

struct Head {
    status: u16,
    content_length: Option<u64>,
    chunked: bool,
}

/// Parse the status line and headers, leaving the reader at the body.
async fn read_head(reader: &mut BufReader<UnixStream>) -> Result<Head, RuntimeError> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| RuntimeError::Decode(format!("bad status line: {:?}", status_line.trim())))?;

    let mut content_length = None;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse::<u64>().ok();
        } else if let Some(value) = lower.strip_prefix("transfer-encoding:") {
            chunked = value.contains("chunked");
        }
    }

    Ok(Head { status, content_length, chunked })
}

enum Framing {
    /// Exactly this many body bytes remain.
    Length(u64),
    Chunked { remaining: u64, finished: bool },
    /// No framing headers: body runs to connection close.
    UntilClose,
}

pub(crate) struct Response {
    pub(crate) status: u16,
    reader: BufReader<UnixStream>,
    framing: Framing,
}

impl Response {
    fn new(head: Head, reader: BufReader<UnixStream>) -> Self {
        let framing = if head.chunked {
            Framing::Chunked { remaining: 0, finished: false }
        } else if head.status == 204 || head.status == 304 {
            Framing::Length(0)
        } else {
            match head.content_length {
                Some(n) => Framing::Length(n),
                None => Framing::UntilClose,
            }
        };
        Self { status: head.status, reader, framing }
    }

    /// Next run of body bytes, or `None` at end of body.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, RuntimeError> {
        match &mut self.framing {
            Framing::Length(remaining) => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let want = (*remaining).min(READ_BUF as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = self.reader.read(&mut buf).await?;
                if n == 0 {
                    return Err(RuntimeError::Decode("body truncated".to_string()));
                }
                buf.truncate(n);
                *remaining -= n as u64;
                Ok(Some(buf))
            }
            Framing::Chunked { remaining, finished } => {
                if *finished {
                    return Ok(None);
                }
                if *remaining == 0 {
                    let size = read_chunk_size(&mut self.reader).await?;
                    if size == 0 {
                        // Trailer section ends at the blank line.
                        loop {
                            let mut line = String::new();
                            let n = self.reader.read_line(&mut line).await?;
                            if n == 0 || line == "\r\n" || line == "\n" {
                                break;
                            }
                        }
                        *finished = true;
                        return Ok(None);
                    }
                    *remaining = size;
                }
                let want = (*remaining).min(READ_BUF as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = self.reader.read(&mut buf).await?;
                if n == 0 {
                    return Err(RuntimeError::Decode("chunked body truncated".to_string()));
                }
                buf.truncate(n);
                *remaining -= n as u64;
                if *remaining == 0 {
                    // Consume the CRLF that terminates the chunk data.
                    let mut crlf = [0u8; 2];
                    self.reader.read_exact(&mut crlf).await?;
                }
                Ok(Some(buf))
            }
            Framing::UntilClose => {
                let mut buf = vec![0u8; READ_BUF];
                let n = self.reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
        }
    }

    pub(crate) async fn read_to_end(mut self) -> Result<Vec<u8>, RuntimeError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    pub(crate) async fn read_to_string(self) -> Result<String, RuntimeError> {
        let bytes = self.read_to_end().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drain the body without retaining it.
    pub(crate) async fn drain(mut self) -> Result<(), RuntimeError> {
        while self.next_chunk().await?.is_some() {}
        Ok(())
    }

    /// Consume an error response into [`RuntimeError::Api`], extracting the
    /// daemon's `{"message": ...}` body when present.
    pub(crate) async fn into_api_error(self) -> RuntimeError {
        let status = self.status;
        let message = match self.read_to_string().await {
            Ok(body) => {
                match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(value) => value
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or(body),
                    Err(_) => body,
                }
            }
            Err(_) => String::new(),
        };
        RuntimeError::Api { status, message: message.trim().to_string() }
    }
}

/// Read and parse a chunk-size line, ignoring chunk extensions.
async fn read_chunk_size(reader: &mut BufReader<UnixStream>) -> Result<u64, RuntimeError> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let size_str = line.trim().split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size_str, 16)
        .map_err(|_| RuntimeError::Decode(format!("bad chunk size: {:?}", line.trim())))
}

/// Percent-encode a query parameter value. Unreserved characters and the
/// query-safe `/` and `:` are left as-is.
pub(crate) fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        let safe = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'.' | b'_' | b'~' | b'/' | b':');
        if safe {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
