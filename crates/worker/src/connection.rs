// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection supervision for the control-plane channel.
//!
//! One authenticated WebSocket session at a time, redialed with exponential
//! backoff. On a live session three activities cooperate: the read loop
//! (sole owner of the stream half and of the `done` signal), the write loop
//! (drains the outbound queue), and the heartbeat loop. The sink is shared
//! behind a mutex held only for the duration of one write.

use crate::config::WorkerConfig;
use crate::lifecycle::TaskManager;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
/// Interval between outbound pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Read deadline; refreshed by every inbound frame, pongs included.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Deadline for a single outbound write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Outbound queue depth.
pub const SEND_QUEUE_CAPACITY: usize = 256;
/// How long an enqueue may wait on a full queue before failing locally.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Next reconnect delay: double, capped.
pub fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RECONNECT_DELAY)
}

/// Errors surfaced to callers of [`Outbound::send`].
#[derive(Debug, Error)]
pub enum SendError {
    #[error("timeout sending message")]
    Timeout,
    #[error("worker is shutting down")]
    Shutdown,
}

/// Handle for enqueueing outbound frames, FIFO per session.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Enqueue a frame for the write loop. Fails locally after
    /// [`SEND_TIMEOUT`] on a full queue, or immediately on shutdown.
    pub async fn send(&self, frame: String) -> Result<(), SendError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SendError::Shutdown),
            result = self.tx.send_timeout(frame, SEND_TIMEOUT) => match result {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(SendError::Timeout),
                Err(SendTimeoutError::Closed(_)) => Err(SendError::Shutdown),
            },
        }
    }
}

#[derive(Debug, Error)]
enum DialError {
    #[error("invalid channel URL: {0}")]
    Request(#[source] WsError),
    #[error("invalid credential header")]
    Credential,
    #[error("failed to dial control plane: {0}")]
    Dial(#[source] WsError),
}

/// Supervises the control-plane session until shutdown.
pub struct Connection {
    config: Arc<WorkerConfig>,
    manager: Arc<TaskManager>,
    outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    last_heartbeat: Arc<Mutex<Instant>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        config: Arc<WorkerConfig>,
        manager: Arc<TaskManager>,
        outbound_rx: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            manager,
            outbound_rx,
            cancel,
            last_heartbeat: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Dial-and-run loop; returns only on shutdown.
    pub async fn run(mut self) {
        let mut delay = INITIAL_RECONNECT_DELAY;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            match self.dial().await {
                Err(e) => {
                    error!(error = %e, retry_in_secs = delay.as_secs(), "failed to connect");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = next_delay(delay);
                }
                Ok(ws) => {
                    delay = INITIAL_RECONNECT_DELAY;
                    info!("successfully connected to server");
                    self.run_session(ws).await;
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    warn!("connection closed, will attempt to reconnect");
                }
            }
        }
    }

    async fn dial(&self) -> Result<WsStream, DialError> {
        let url = with_worker_id(&self.config.channel_url, &self.config.worker_id);
        info!(url = %url, "connecting to control plane");

        let mut request = url.into_client_request().map_err(DialError::Request)?;
        let bearer = format!("Bearer {}", self.config.api_key);
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|_| DialError::Credential)?,
        );

        let (ws, _response) = connect_async(request).await.map_err(DialError::Dial)?;
        Ok(ws)
    }

    /// Run the three session loops until the read loop terminates, then
    /// close the session before the next dial.
    async fn run_session(&mut self, ws: WsStream) {
        let (sink, stream) = ws.split();
        let sink = Arc::new(tokio::sync::Mutex::new(sink));
        let done = CancellationToken::new();

        let read = read_loop(
            stream,
            Arc::clone(&self.manager),
            Arc::clone(&self.last_heartbeat),
            self.cancel.clone(),
            done.clone(),
        );
        let write = write_loop(&mut self.outbound_rx, Arc::clone(&sink), self.cancel.clone(), done.clone());
        let heartbeat = heartbeat_loop(Arc::clone(&sink), self.cancel.clone(), done.clone());

        tokio::join!(read, write, heartbeat);

        // Best-effort closing handshake; the session is torn down either way.
        let mut sink = sink.lock().await;
        if let Ok(Err(e)) = timeout(WRITE_WAIT, sink.send(Message::Close(None))).await {
            debug!(error = %e, "error sending close frame");
        }
        let _ = timeout(WRITE_WAIT, sink.close()).await;
    }
}

/// Sole owner of the stream half; closes `done` on return, terminating the
/// other loops.
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    manager: Arc<TaskManager>,
    last_heartbeat: Arc<Mutex<Instant>>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    let _terminator = done.drop_guard();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = timeout(PONG_WAIT, stream.next()) => message,
        };

        match message {
            Err(_elapsed) => {
                error!(deadline_secs = PONG_WAIT.as_secs(), "read deadline exceeded");
                return;
            }
            Ok(None) => {
                debug!("stream ended");
                return;
            }
            Ok(Some(Err(e))) => {
                match e {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => {
                        debug!("connection closed")
                    }
                    other => error!(error = %other, "read error"),
                }
                return;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                debug!(frame = %text, "received frame");
                manager.handle_frame(&text).await;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                *last_heartbeat.lock() = Instant::now();
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                let clean = matches!(
                    frame.as_ref().map(|f| f.code),
                    Some(CloseCode::Normal) | Some(CloseCode::Away) | None
                );
                if clean {
                    debug!(?frame, "received close frame");
                } else {
                    error!(?frame, "received unexpected close frame");
                }
                return;
            }
            // Pings are answered by the protocol layer; binary frames are
            // not part of the channel contract.
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// Drains the outbound queue onto the wire, strictly in enqueue order.
async fn write_loop(
    outbound_rx: &mut mpsc::Receiver<String>,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = done.cancelled() => return,
            frame = outbound_rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };

        debug!(frame = %frame, "sending frame");
        let mut sink = sink.lock().await;
        match timeout(WRITE_WAIT, sink.send(Message::Text(frame))).await {
            Err(_) => {
                error!(deadline_secs = WRITE_WAIT.as_secs(), "write deadline exceeded");
                return;
            }
            Ok(Err(e)) => {
                error!(error = %e, "write error");
                return;
            }
            Ok(Ok(())) => {}
        }
    }
}

/// Pings the control plane on a fixed interval so dead sessions are
/// detected from both sides.
async fn heartbeat_loop(
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = done.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let mut sink = sink.lock().await;
        match timeout(WRITE_WAIT, sink.send(Message::Ping(Vec::new()))).await {
            Err(_) => {
                error!(deadline_secs = WRITE_WAIT.as_secs(), "ping deadline exceeded");
                return;
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to send ping");
                return;
            }
            Ok(Ok(())) => {}
        }
    }
}

/// Append the worker id to the channel URL's query string.
fn with_worker_id(url: &str, worker_id: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}worker_id={}", url, separator, query_escape(worker_id))
}

/// Percent-encode a query value; worker ids are operator-chosen strings.
fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        let safe = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~');
        if safe {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
