//! Language-model chat over two transports.
//!
//! The streaming HTTP chat-completion endpoint is the primary transport; the
//! signed WebSocket chat endpoint is the single fallback. Both implement
//! [`ChatBackend`] so the [`TransportSelector`] can be exercised with fakes.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::context::ChatMessage;
use crate::errors::{GatewayResult, Transport};

pub mod http;
pub mod selector;
pub mod websocket;

pub use http::{HttpChatBackend, SseLineParser, StreamEvent};
pub use selector::{DialogueReply, TransportSelector};
pub use websocket::WebSocketChatBackend;

/// A transport able to complete a chat.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Transport reported with results and failures of this backend.
    fn transport(&self) -> Transport;

    /// Generate the assistant reply to `messages`, finishing before `deadline`.
    async fn complete(&self, messages: &[ChatMessage], deadline: Instant) -> GatewayResult<String>;
}
