//! Chat over the signed WebSocket endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

use super::ChatBackend;
use crate::config::Credentials;
use crate::core::context::ChatMessage;
use crate::core::session::{ChatParameters, SessionRequest, SessionSettings, StreamingSession};
use crate::errors::{GatewayResult, Transport};

/// Runs a text-mode [`StreamingSession`] per call.
pub struct WebSocketChatBackend {
    endpoint: String,
    credentials: Arc<Credentials>,
    settings: SessionSettings,
    parameters: ChatParameters,
}

impl WebSocketChatBackend {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Arc<Credentials>,
        settings: SessionSettings,
        parameters: ChatParameters,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            settings,
            parameters,
        }
    }
}

#[async_trait]
impl ChatBackend for WebSocketChatBackend {
    fn transport(&self) -> Transport {
        Transport::WebSocket
    }

    async fn complete(&self, messages: &[ChatMessage], deadline: Instant) -> GatewayResult<String> {
        let session = StreamingSession::new(
            self.endpoint.clone(),
            self.credentials.clone(),
            self.settings.clone(),
        );
        let output = session
            .run(
                SessionRequest::Chat {
                    parameters: self.parameters.clone(),
                    messages: messages.to_vec(),
                },
                deadline,
            )
            .await?;

        info!(
            "WebSocket chat completed ({} chars, sid {:?})",
            output.answer.chars().count(),
            output.sid
        );
        Ok(output.answer)
    }
}
