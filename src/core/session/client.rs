//! Signed WebSocket streaming session.
//!
//! One [`StreamingSession::run`] call owns one connection for its whole
//! lifetime and moves through
//! `Connecting → Authenticated → Streaming → Draining → Closed`, or `Failed`.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐  frames (paced)   ┌──────────────┐
//!  SessionRequest │ sender task  │──────────────────▶│              │
//!  ──────────────▶│              │                   │   WebSocket  │
//!                 └──────┬───────┘                   │  (split sink │
//!                        │ first_sent / finished     │   + stream)  │
//!                        │ abort (CancellationToken) │              │
//!                 ┌──────▼───────┐  protocol msgs    │              │
//!  SessionOutput ◀│ receiver task│◀──────────────────│              │
//!                 └──────────────┘                   └──────────────┘
//! ```
//!
//! The sink is shared behind a `tokio::sync::Mutex` so the receiver can close
//! the connection on a terminal status while the sender is paused between
//! frames. Every call runs against a deadline; on expiry `abort` is cancelled,
//! both tasks stop and a `Timeout` failure is returned.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::assembler::{ResultAssembler, SessionOutput};
use super::messages::ProtocolMessage;
use super::profile::{OutboundFrame, SessionRequest};
use crate::config::Credentials;
use crate::core::audio::FRAME_CHUNK_SIZE;
use crate::core::signer;
use crate::errors::{GatewayError, GatewayResult};

// =============================================================================
// Constants
// =============================================================================

/// Delay between consecutive audio frames; matches 1280 bytes of 16 kHz PCM.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on waiting for the sender after the receiver has finished.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream id sent with every interactive frame.
pub const DEFAULT_STMID: &str = "1";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

// =============================================================================
// Session state
// =============================================================================

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticated,
    Streaming,
    Draining,
    Closed,
    Failed,
}

/// Timing and framing of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub drain_timeout: Duration,
    pub frame_interval: Duration,
    pub chunk_size: usize,
    pub stmid: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            chunk_size: FRAME_CHUNK_SIZE,
            stmid: DEFAULT_STMID.to_string(),
        }
    }
}

/// Coordination flags shared by the sender and the receiver.
#[derive(Debug, Clone, Default)]
struct SessionSignals {
    /// The First frame is on the wire
    first_sent: CancellationToken,
    /// The receiver saw the terminal final status
    finished: CancellationToken,
    /// Stop everything now
    abort: CancellationToken,
}

// =============================================================================
// StreamingSession
// =============================================================================

/// One signed WebSocket exchange against a Spark endpoint.
pub struct StreamingSession {
    endpoint: String,
    credentials: Arc<Credentials>,
    settings: SessionSettings,
    state_tx: watch::Sender<SessionState>,
}

impl StreamingSession {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Arc<Credentials>,
        settings: SessionSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            endpoint: endpoint.into(),
            credentials,
            settings,
            state_tx,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session {} -> {:?}", self.endpoint, state);
        self.state_tx.send_replace(state);
    }

    /// Run `request` to completion or until `deadline`.
    pub async fn run(
        &self,
        request: SessionRequest,
        deadline: Instant,
    ) -> GatewayResult<SessionOutput> {
        let signals = SessionSignals::default();

        let result = match timeout_at(deadline, self.run_inner(request, signals.clone())).await {
            Ok(result) => result,
            Err(_) => {
                signals.abort.cancel();
                warn!("Session deadline expired for {}", self.endpoint);
                Err(GatewayError::Timeout(format!(
                    "Streaming session to {} exceeded its deadline",
                    self.endpoint
                )))
            }
        };

        match &result {
            Ok(_) => self.set_state(SessionState::Closed),
            Err(e) => {
                error!("Session to {} failed: {}", self.endpoint, e);
                self.set_state(SessionState::Failed);
            }
        }
        result
    }

    async fn run_inner(
        &self,
        request: SessionRequest,
        signals: SessionSignals,
    ) -> GatewayResult<SessionOutput> {
        self.set_state(SessionState::Connecting);

        let capability = request.capability();
        let frames = request.outbound_frames(
            &self.credentials.app_id,
            &self.settings.stmid,
            self.settings.chunk_size,
        )?;

        let ws_stream = self.connect().await?;
        self.set_state(SessionState::Authenticated);

        let (sink, stream) = ws_stream.split();
        let sink: SharedSink = Arc::new(Mutex::new(sink));

        self.set_state(SessionState::Streaming);
        info!(
            "Streaming {} frame(s) to {} ({:?})",
            frames.len(),
            self.endpoint,
            capability
        );

        let sender = tokio::spawn(send_frames(
            sink.clone(),
            frames,
            self.settings.frame_interval,
            signals.clone(),
        ));
        let receiver = tokio::spawn(receive_messages(
            stream,
            sink.clone(),
            ResultAssembler::new(capability),
            signals.clone(),
        ));

        let received = match receiver.await {
            Ok(received) => received,
            Err(e) => {
                signals.abort.cancel();
                Err(GatewayError::ConnectError(format!("Receiver task failed: {e}")))
            }
        };

        self.set_state(SessionState::Draining);
        signals.finished.cancel();
        let sent = match timeout(self.settings.drain_timeout, sender).await {
            Ok(Ok(sent)) => Some(sent),
            Ok(Err(e)) => Some(Err(GatewayError::ConnectError(format!(
                "Sender task failed: {e}"
            )))),
            Err(_) => {
                warn!("Sender did not drain in time, forcing close");
                signals.abort.cancel();
                None
            }
        };

        close_sink(&sink).await;

        match (received, sent) {
            (Ok(Some(output)), _) => Ok(output),
            (Ok(None), Some(Err(send_error))) => Err(send_error),
            (Ok(None), _) => Err(GatewayError::ConnectError(
                "Session aborted before the final status".to_string(),
            )),
            (Err(e), _) => Err(e),
        }
    }

    async fn connect(&self) -> GatewayResult<WsStream> {
        let signed = signer::sign(
            &self.endpoint,
            "GET",
            &self.credentials.api_key,
            &self.credentials.api_secret,
        )?;

        debug!("Connecting to {} (host {})", self.endpoint, signed.host);
        let (ws_stream, response) =
            match timeout(self.settings.connect_timeout, connect_async(&signed.final_url)).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => return Err(map_connect_error(e)),
                Err(_) => {
                    return Err(GatewayError::ConnectError(format!(
                        "Connection to {} timed out after {:?}",
                        self.endpoint, self.settings.connect_timeout
                    )));
                }
            };

        info!(
            "Connected to {} (HTTP {})",
            self.endpoint,
            response.status()
        );
        Ok(ws_stream)
    }
}

fn map_connect_error(e: tungstenite::Error) -> GatewayError {
    if let tungstenite::Error::Http(response) = &e {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return GatewayError::AuthError(format!("Handshake rejected with HTTP {status}"));
        }
        return GatewayError::ConnectError(format!("Handshake rejected with HTTP {status}"));
    }
    GatewayError::ConnectError(format!("Failed to connect: {e}"))
}

async fn close_sink(sink: &SharedSink) {
    let mut sink = sink.lock().await;
    if let Err(e) = sink.close().await {
        debug!("Closing connection: {}", e);
    }
}

// =============================================================================
// Sender
// =============================================================================

/// Send `frames` in order, pausing `interval` after each paced frame.
///
/// Returns the number of frames sent. Stops early without error when the
/// receiver finished or the session was aborted.
async fn send_frames(
    sink: SharedSink,
    frames: Vec<OutboundFrame>,
    interval: Duration,
    signals: SessionSignals,
) -> GatewayResult<usize> {
    let total = frames.len();

    for (index, frame) in frames.into_iter().enumerate() {
        if signals.abort.is_cancelled() || signals.finished.is_cancelled() {
            debug!("Sender stopping after {}/{} frames", index, total);
            return Ok(index);
        }

        let status = frame.status;
        let paced = frame.paced;
        let result = tokio::select! {
            biased;
            _ = signals.abort.cancelled() => return Ok(index),
            result = async {
                let mut sink = sink.lock().await;
                sink.send(Message::Text(frame.text.into())).await
            } => result,
        };

        if let Err(e) = result {
            if signals.abort.is_cancelled() || signals.finished.is_cancelled() {
                return Ok(index);
            }
            signals.abort.cancel();
            return Err(GatewayError::ConnectError(format!(
                "Failed to send frame {}: {e}",
                index + 1
            )));
        }

        debug!("Sent frame {}/{} ({:?})", index + 1, total, status);
        if index == 0 {
            signals.first_sent.cancel();
        }

        if paced && index + 1 < total {
            tokio::select! {
                _ = signals.abort.cancelled() => return Ok(index + 1),
                _ = signals.finished.cancelled() => return Ok(index + 1),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    Ok(total)
}

// =============================================================================
// Receiver
// =============================================================================

/// Read inbound messages until the terminal final status.
///
/// `Ok(None)` means the session was aborted from outside.
async fn receive_messages(
    mut stream: SplitStream<WsStream>,
    sink: SharedSink,
    mut assembler: ResultAssembler,
    signals: SessionSignals,
) -> GatewayResult<Option<SessionOutput>> {
    tokio::select! {
        _ = signals.abort.cancelled() => return Ok(None),
        _ = signals.first_sent.cancelled() => {}
    }

    loop {
        let next = tokio::select! {
            _ = signals.abort.cancelled() => {
                close_sink(&sink).await;
                return Ok(None);
            }
            next = stream.next() => next,
        };

        let failure = match next {
            Some(Ok(Message::Text(text))) => {
                match handle_websocket_message(text.as_str(), &mut assembler) {
                    Ok(true) => {
                        signals.finished.cancel();
                        return Ok(Some(assembler.finish()));
                    }
                    Ok(false) => continue,
                    Err(e) => e,
                }
            }
            Some(Ok(Message::Close(frame))) => GatewayError::ConnectError(format!(
                "Connection closed before the final status: {frame:?}"
            )),
            Some(Ok(other)) => {
                debug!("Ignoring non-text message ({} bytes)", other.len());
                continue;
            }
            Some(Err(e)) => GatewayError::ConnectError(format!("WebSocket error: {e}")),
            None => GatewayError::ConnectError(
                "Connection ended before the final status".to_string(),
            ),
        };

        signals.abort.cancel();
        close_sink(&sink).await;
        return Err(failure);
    }
}

/// Handle one inbound text message.
///
/// Returns `true` when the exchange is finished.
pub(crate) fn handle_websocket_message(
    text: &str,
    assembler: &mut ResultAssembler,
) -> GatewayResult<bool> {
    let message = match ProtocolMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Skipping unparsable message: {}", e);
            return Ok(false);
        }
    };

    if message.is_error() {
        error!(
            "Service returned code {} (sid {:?}): {}",
            message.code,
            message.sid,
            message.message.as_deref().unwrap_or("")
        );
        return Err(GatewayError::ProtocolError {
            code: message.code,
            channel: message.fragments.first().map(|f| f.channel),
            message: message
                .message
                .unwrap_or_else(|| "remote service error".to_string()),
        });
    }

    assembler.set_sid(message.sid.clone());

    let mut finished = false;
    for fragment in &message.fragments {
        debug!(
            "Fragment on {} channel (status {:?})",
            fragment.channel, fragment.status
        );
        finished |= assembler.apply(fragment)?;
    }

    if message.is_final() && assembler.capability().finishes_on_header_status() {
        finished = true;
    }
    Ok(finished)
}
