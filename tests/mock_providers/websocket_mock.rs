//! WebSocket Mock Server for Spark endpoints
//!
//! Accepts signed connections, records the handshake URI and every inbound
//! frame, and answers with scripted messages.

use super::MockStats;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// What the server sends and when.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Sent right after the first inbound frame
    pub after_first: Vec<String>,
    /// Sent after the frame that ends the client's input
    pub after_last: Vec<String>,
    /// Reject the handshake with this HTTP status
    pub reject_with: Option<u16>,
    /// Pause before each scripted reply
    pub reply_delay: Duration,
    /// Never answer
    pub silent: bool,
}

impl MockScript {
    pub fn after_last(replies: Vec<String>) -> Self {
        Self {
            after_last: replies,
            ..Default::default()
        }
    }

    pub fn after_first(replies: Vec<String>) -> Self {
        Self {
            after_first: replies,
            ..Default::default()
        }
    }

    pub fn reject(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Default::default()
        }
    }
}

/// Recorded traffic
#[derive(Debug, Default)]
pub struct WebSocketMockState {
    pub stats: MockStats,
    pub uris: Mutex<Vec<String>>,
    pub frames: Mutex<Vec<Value>>,
    pub frame_times: Mutex<Vec<Instant>>,
}

impl WebSocketMockState {
    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().clone()
    }

    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().clone()
    }

    pub fn frame_gaps(&self) -> Vec<Duration> {
        let times = self.frame_times.lock();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// A running mock server
pub struct WebSocketMock {
    pub addr: SocketAddr,
    pub state: Arc<WebSocketMockState>,
}

impl WebSocketMock {
    pub fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

/// Start a mock server that runs `script` for every connection.
pub async fn start_websocket_mock(script: MockScript) -> WebSocketMock {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(WebSocketMockState::default());

    let server_state = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = server_state.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let _ = handle_connection(stream, state, script).await;
            });
        }
    });

    WebSocketMock { addr, state }
}

/// True for the frame that completes the client's input: the Last audio
/// frame, or any text envelope (which has no audio payload).
fn ends_input(frame: &Value) -> bool {
    let audio = &frame["payload"]["audio"];
    audio.is_null() || audio["status"] == 2
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<WebSocketMockState>,
    script: MockScript,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let record_state = state.clone();
    let reject_with = script.reject_with;
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        record_state.uris.lock().push(request.uri().to_string());
        match reject_with {
            Some(status) => {
                let mut error = ErrorResponse::new(Some("rejected".to_string()));
                *error.status_mut() = StatusCode::from_u16(status).unwrap();
                Err(error)
            }
            None => Ok(response),
        }
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    state.stats.connections.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();

    let mut count = 0usize;
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(text.as_str())?;
                count += 1;
                state.stats.frames.fetch_add(1, Ordering::SeqCst);
                state.frame_times.lock().push(Instant::now());
                let last = ends_input(&frame);
                state.frames.lock().push(frame);

                if script.silent {
                    continue;
                }
                let mut replies = Vec::new();
                if count == 1 {
                    replies.extend(script.after_first.iter().cloned());
                }
                if last {
                    replies.extend(script.after_last.iter().cloned());
                }
                for reply in replies {
                    if !script.reply_delay.is_zero() {
                        tokio::time::sleep(script.reply_delay).await;
                    }
                    write.send(Message::Text(reply.into())).await?;
                }
            }
            Ok(Message::Close(_)) => {
                state.stats.client_closes.fetch_add(1, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    Ok(())
}
