//! HTTP-first chat with a single WebSocket fallback.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use super::ChatBackend;
use crate::core::context::ChatMessage;
use crate::errors::{ServiceFailure, Transport};

/// A successful chat completion and the transport that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueReply {
    pub text: String,
    pub transport: Transport,
}

/// Two-step transport strategy for language-model calls.
///
/// The primary is tried once; any failure triggers exactly one attempt on the
/// fallback. Without a primary the fallback is the only attempt. Both
/// attempts run against the same deadline.
pub struct TransportSelector {
    primary: Option<Arc<dyn ChatBackend>>,
    fallback: Arc<dyn ChatBackend>,
}

impl TransportSelector {
    pub fn new(primary: Option<Arc<dyn ChatBackend>>, fallback: Arc<dyn ChatBackend>) -> Self {
        Self { primary, fallback }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub async fn ask(
        &self,
        messages: &[ChatMessage],
        deadline: Instant,
    ) -> Result<DialogueReply, ServiceFailure> {
        if let Some(primary) = &self.primary {
            match primary.complete(messages, deadline).await {
                Ok(text) => {
                    return Ok(DialogueReply {
                        text,
                        transport: primary.transport(),
                    });
                }
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(ServiceFailure::new(primary.transport(), e));
                    }
                    warn!(
                        "{} chat failed ({}), falling back to {}",
                        primary.transport(),
                        e,
                        self.fallback.transport()
                    );
                }
            }
        } else {
            info!(
                "No primary chat transport configured, using {}",
                self.fallback.transport()
            );
        }

        let transport = self.fallback.transport();
        self.fallback
            .complete(messages, deadline)
            .await
            .map(|text| DialogueReply { text, transport })
            .map_err(|e| ServiceFailure::new(transport, e))
    }
}
