//! Streaming HTTP chat-completion client.
//!
//! The endpoint answers with `data: {...}` lines, each carrying an incremental
//! `choices[0].delta.content`, terminated by `data: [DONE]`. Network chunks do
//! not respect line boundaries, so [`SseLineParser`] buffers partial lines.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::ChatBackend;
use crate::core::context::ChatMessage;
use crate::errors::{GatewayError, GatewayResult, Transport};

/// Terminal sentinel of the stream.
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    user: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// One parsed stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
}

/// Incremental parser of `data:` lines.
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: Vec<u8>,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return the events of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<StreamEvent> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!("Skipping non UTF-8 stream line: {}", e);
            return None;
        }
    };

    let data = line.strip_prefix("data:")?.trim();
    if data == DONE_MARKER {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(data) {
        Ok(json) => json["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|content| !content.is_empty())
            .map(|content| StreamEvent::Delta(content.to_string())),
        Err(e) => {
            warn!("Skipping malformed stream chunk: {}", e);
            None
        }
    }
}

/// Chat over the streaming HTTP endpoint.
pub struct HttpChatBackend {
    client: reqwest::Client,
    url: String,
    api_password: String,
    model: String,
    user: String,
}

impl HttpChatBackend {
    pub fn new(
        url: impl Into<String>,
        api_password: &str,
        model: impl Into<String>,
        user: impl Into<String>,
    ) -> GatewayResult<Self> {
        let token = api_password
            .strip_prefix("Bearer ")
            .unwrap_or(api_password)
            .trim();
        if token.is_empty() {
            return Err(GatewayError::AuthError(
                "HTTP chat API password must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::ConnectError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            api_password: token.to_string(),
            model: model.into(),
            user: user.into(),
        })
    }

    async fn stream_completion(&self, messages: &[ChatMessage]) -> GatewayResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            user: &self.user,
            messages,
            stream: true,
        };

        debug!("POST {} ({} messages)", self.url, messages.len());
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_password)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::ConnectError(format!("HTTP chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut parser = SseLineParser::new();
        let mut answer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| GatewayError::ConnectError(format!("HTTP chat stream failed: {e}")))?;
            for event in parser.push(&chunk) {
                match event {
                    StreamEvent::Delta(content) => answer.push_str(&content),
                    StreamEvent::Done => return Ok(answer),
                }
            }
        }

        if let Some(StreamEvent::Delta(content)) = parser.finish() {
            answer.push_str(&content);
        }
        Ok(answer)
    }
}

impl Drop for HttpChatBackend {
    fn drop(&mut self) {
        self.api_password.zeroize();
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    fn transport(&self) -> Transport {
        Transport::Http
    }

    async fn complete(&self, messages: &[ChatMessage], deadline: Instant) -> GatewayResult<String> {
        let answer = timeout_at(deadline, self.stream_completion(messages))
            .await
            .map_err(|_| GatewayError::Timeout("HTTP chat exceeded its deadline".to_string()))??;
        info!("HTTP chat completed ({} chars)", answer.chars().count());
        Ok(answer)
    }
}
