//! Native WebSocket transport — `tokio-tungstenite`.
//!
//! - Background tokio task owns the socket
//! - Exponential backoff reconnection with jitter
//! - Raw text frames in both directions; protocol state lives in
//!   [`crate::ws::ConnectionManager`]
//! - Stream-based event delivery to the consumer
//!
//! Writes issued while the socket is down are dropped: the connection manager
//! re-queues every wanted subscription on disconnect and releases nothing
//! before the next server identity frame.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::ws::{MessageOut, WsConfig, WsEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    Send(String),
    Disconnect,
}

// ─── Disconnect reasons for reconnection decision ────────────────────────────

enum DisconnectReason {
    UserRequested,
    RateLimited,
    Error(String),
}

// ─── Background task state ───────────────────────────────────────────────────

struct TaskState {
    config: WsConfig,
    event_tx: mpsc::Sender<WsEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    reconnect_attempts: u32,
    connected: Arc<AtomicBool>,
}

impl TaskState {
    fn emit(&self, event: WsEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::warn!("WS event channel full or closed, dropping event");
        }
    }

    fn should_reconnect(&self) -> bool {
        self.config.reconnect && self.reconnect_attempts < self.config.max_reconnect_attempts
    }
}

// ─── Public WsClient ─────────────────────────────────────────────────────────

/// Native WebSocket client using `tokio-tungstenite`.
///
/// Uses a background tokio task for connection management.
/// The public API communicates with it via mpsc channels.
pub struct WsClient {
    config: WsConfig,
    cmd_tx: Option<mpsc::Sender<Command>>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<WsEvent>>,
    event_tx: mpsc::Sender<WsEvent>,
    task_handle: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl WsClient {
    /// Create a new WS client. Does not connect yet.
    pub fn new(config: WsConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Self {
            config,
            cmd_tx: None,
            event_rx: tokio::sync::Mutex::new(event_rx),
            event_tx,
            task_handle: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Spawn the background task that connects and keeps reconnecting.
    pub fn connect(&mut self) -> Result<(), WsError> {
        if self.cmd_tx.is_some() {
            return Ok(());
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        self.cmd_tx = Some(cmd_tx);

        let state = TaskState {
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
            cmd_rx,
            reconnect_attempts: 0,
            connected: Arc::clone(&self.connected),
        };

        self.task_handle = Some(tokio::spawn(run_task(state)));
        Ok(())
    }

    /// Send a graceful close and wait for the background task to finish.
    pub async fn disconnect(&mut self) -> Result<(), WsError> {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Disconnect).await;
        }

        if let Some(handle) = self.task_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Queue a text frame for the socket.
    pub fn send_text(&self, text: String) -> Result<(), WsError> {
        match &self.cmd_tx {
            Some(tx) => tx.try_send(Command::Send(text)).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    WsError::SendFailed("Command channel full".into())
                }
                mpsc::error::TrySendError::Closed(_) => WsError::NotConnected,
            }),
            None => Err(WsError::NotConnected),
        }
    }

    /// Serialize and queue a protocol message.
    pub fn send(&self, msg: &MessageOut) -> Result<(), WsError> {
        self.send_text(msg.to_json()?)
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get a stream of events from the WebSocket connection.
    ///
    /// The returned stream borrows `self`, so it must be dropped
    /// before calling `disconnect()`.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = WsEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    loop {
        // ── 1. Attempt connection ────────────────────────────────────────
        let (sink, stream) = match attempt_connect(&state.config.url).await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!("WebSocket connection failed: {}", e);
                state.emit(WsEvent::Error(format!("Connection failed: {}", e)));

                if state.should_reconnect() {
                    backoff_sleep(&mut state, false).await;
                    if drain_commands(&mut state) {
                        return;
                    }
                    continue;
                }
                state.emit(WsEvent::MaxReconnectReached {
                    attempts: state.reconnect_attempts,
                });
                return;
            }
        };

        // ── 2. Connected ─────────────────────────────────────────────────
        state.reconnect_attempts = 0;
        state.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %state.config.url, "WebSocket connected");
        state.emit(WsEvent::Connected);

        // ── 3. Inner select! loop ────────────────────────────────────────
        let reason = run_connected(&mut state, sink, stream).await;
        state.connected.store(false, Ordering::SeqCst);

        // ── 4. Post-disconnect decision ──────────────────────────────────
        let rate_limited = match reason {
            DisconnectReason::UserRequested => return,
            DisconnectReason::RateLimited => true,
            DisconnectReason::Error(reason) => {
                tracing::warn!(%reason, "WebSocket disconnected");
                false
            }
        };

        if !state.should_reconnect() {
            state.emit(WsEvent::MaxReconnectReached {
                attempts: state.reconnect_attempts,
            });
            return;
        }
        backoff_sleep(&mut state, rate_limited).await;
        if drain_commands(&mut state) {
            return;
        }
    }
}

/// The inner connected loop. Runs until the connection breaks.
async fn run_connected(
    state: &mut TaskState,
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
) -> DisconnectReason {
    loop {
        tokio::select! {
            // ── a) Incoming WS message ───────────────────────────────────
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = text.as_ref();
                        state.emit(WsEvent::Message(text_str.to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => state.emit(WsEvent::Message(text)),
                            Err(_) => tracing::debug!("Dropping non-UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        state.emit(WsEvent::Disconnected {
                            code: Some(code),
                            reason: reason.clone(),
                        });
                        return match code {
                            1008 | 1013 => DisconnectReason::RateLimited,
                            _ => DisconnectReason::Error(reason),
                        };
                    }
                    Some(Ok(_)) => {} // Pong, raw Frame
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        tracing::error!("WebSocket error: {}", reason);
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason: reason.clone(),
                        });
                        return DisconnectReason::Error(reason);
                    }
                    None => {
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason: "Stream ended".into(),
                        });
                        return DisconnectReason::Error("Stream ended".into());
                    }
                }
            }

            // ── b) Command from public API ───────────────────────────────
            cmd = state.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!("Send failed: {}", e);
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = sink.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "Client disconnect".into(),
                        }))).await;
                        return DisconnectReason::UserRequested;
                    }
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Attempt to establish a WebSocket connection with a 30-second timeout.
async fn attempt_connect(
    url: &str,
) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>), WsError> {
    let (ws_stream, _) = tokio::time::timeout(Duration::from_secs(30), connect_async(url))
        .await
        .map_err(|_| WsError::ConnectionFailed("Connection timeout".to_string()))??;

    Ok(ws_stream.split())
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}

/// Discard writes queued while the socket was down. Returns `true` if a
/// disconnect was requested meanwhile.
fn drain_commands(state: &mut TaskState) -> bool {
    let mut dropped = 0usize;
    while let Ok(cmd) = state.cmd_rx.try_recv() {
        match cmd {
            Command::Send(_) => dropped += 1,
            Command::Disconnect => return true,
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped writes issued while disconnected");
    }
    false
}

// ─── Reconnection backoff ────────────────────────────────────────────────────

fn backoff_delay(base_ms: u32, attempt: u32, rate_limited: bool) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let base = base_ms.saturating_mul(1u32 << exp);

    let (jitter_max, cap) = if rate_limited {
        (1000u32, 300_000u32) // up to 5 minutes for rate limits
    } else {
        (500u32, 60_000u32) // up to 60 seconds normally
    };

    let jitter = rand::random::<u32>() % jitter_max;
    Duration::from_millis(u64::from(base.saturating_add(jitter).min(cap)))
}

async fn backoff_sleep(state: &mut TaskState, rate_limited: bool) {
    state.reconnect_attempts += 1;
    let delay = backoff_delay(
        state.config.base_reconnect_delay_ms,
        state.reconnect_attempts,
        rate_limited,
    );

    tracing::info!(
        "Reconnect attempt {}/{} in {}ms{}",
        state.reconnect_attempts,
        state.config.max_reconnect_attempts,
        delay.as_millis(),
        if rate_limited { " (rate-limited)" } else { "" }
    );

    tokio::time::sleep(delay).await;
}

// ─── Tests ───────────────────────────────────────────────────────────────────
