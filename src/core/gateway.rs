//! Gateway facade.
//!
//! [`AiGateway`] is the only surface the application layer calls. It takes
//! plain inputs (paths, text, conversation ids), applies one deadline per
//! call and returns either the assembled value or a [`ServiceFailure`] that
//! names the transport involved.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Credentials, GatewayConfig};
use crate::core::audio::{MAX_AUDIO_BYTES, load_audio_file};
use crate::core::chat::{
    ChatBackend, DialogueReply, HttpChatBackend, TransportSelector, WebSocketChatBackend,
};
use crate::core::context::{ChatMessage, ContextStore, InMemoryContextStore, Role};
use crate::core::face::{FaceExpression, FaceExpressionClient};
use crate::core::session::{
    ChatParameters, IMAGE_DOMAIN, SessionRequest, SessionSettings, StreamingSession,
    VoiceSettings,
};
use crate::errors::{GatewayError, GatewayResult, ServiceFailure, Transport};

/// Languages accepted by the recognition endpoint.
pub const SUPPORTED_LANGUAGES: &[&str] = &["zh_cn", "en_us"];

pub type RecognitionResult = Result<String, ServiceFailure>;
pub type SynthesisResult = Result<Bytes, ServiceFailure>;
pub type DialogueResult = Result<DialogueReply, ServiceFailure>;

/// Outcome of one interactive voice turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationTurn {
    pub transcript: String,
    pub answer: String,
    /// Synthesized reply, empty when the service sent none
    pub audio: Bytes,
}

pub type ConverseResult = Result<ConversationTurn, ServiceFailure>;
pub type FaceExpressionResult = Result<FaceExpression, ServiceFailure>;

/// Entry point for every AI-service call.
pub struct AiGateway {
    config: GatewayConfig,
    credentials: Arc<Credentials>,
    context: Arc<dyn ContextStore>,
    selector: TransportSelector,
    face: Option<FaceExpressionClient>,
    session_settings: SessionSettings,
}

impl AiGateway {
    /// Build a gateway with an in-memory context store.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let store = Arc::new(InMemoryContextStore::new(config.context_budget));
        Self::with_context_store(config, store)
    }

    /// Build a gateway around an existing context store.
    pub fn with_context_store(
        config: GatewayConfig,
        context: Arc<dyn ContextStore>,
    ) -> GatewayResult<Self> {
        // Both reqwest and tokio-tungstenite use rustls; a provider may already be installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let credentials = Arc::new(config.credentials.clone());
        let session_settings = SessionSettings {
            connect_timeout: config.timeouts.connect,
            drain_timeout: config.timeouts.drain,
            frame_interval: config.timeouts.frame_interval,
            ..Default::default()
        };

        let fallback: Arc<dyn ChatBackend> = Arc::new(WebSocketChatBackend::new(
            config.endpoints.chat_ws_url.clone(),
            credentials.clone(),
            session_settings.clone(),
            ChatParameters::new(config.chat.domain.clone()),
        ));
        let primary: Option<Arc<dyn ChatBackend>> = match credentials.api_password.as_deref() {
            Some(password) if credentials.has_http_password() => {
                let http: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(
                    config.endpoints.chat_http_url.clone(),
                    password,
                    config.chat.model.clone(),
                    config.chat.user.clone(),
                )?);
                Some(http)
            }
            _ => {
                info!("No HTTP chat password configured, chat uses WebSocket only");
                None
            }
        };

        let face = config
            .face
            .as_ref()
            .map(|face| FaceExpressionClient::new(config.endpoints.face_expression_url.clone(), face))
            .transpose()?;

        Ok(Self {
            selector: TransportSelector::new(primary, fallback),
            face,
            config,
            credentials,
            context,
            session_settings,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn context_store(&self) -> Arc<dyn ContextStore> {
        self.context.clone()
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeouts.call
    }

    fn session(&self, endpoint: &str) -> StreamingSession {
        StreamingSession::new(
            endpoint,
            self.credentials.clone(),
            self.session_settings.clone(),
        )
    }

    // =========================================================================
    // Speech
    // =========================================================================

    /// Transcribe an audio file (16 kHz PCM or WAV).
    pub async fn recognize(&self, audio_path: impl AsRef<Path>, language: &str) -> RecognitionResult {
        let ws = |e| ServiceFailure::new(Transport::WebSocket, e);

        let language = normalize_language(language).map_err(ws)?;
        let pcm = load_audio_file(audio_path.as_ref()).await.map_err(ws)?;

        info!("Recognizing {} bytes of audio ({})", pcm.len(), language);
        let output = self
            .session(&self.config.endpoints.recognition_url)
            .run(SessionRequest::Recognize { pcm, language }, self.deadline())
            .await
            .map_err(ws)?;

        Ok(output.transcript.trim().to_string())
    }

    /// Synthesize `text` with `voice`, or the configured default voice.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> SynthesisResult {
        let voice = VoiceSettings::new(
            voice
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(&self.config.default_voice),
        );

        let output = self
            .session(&self.config.endpoints.synthesis_url)
            .run(
                SessionRequest::Synthesize {
                    text: text.to_string(),
                    voice,
                },
                self.deadline(),
            )
            .await
            .map_err(|e| ServiceFailure::new(Transport::WebSocket, e))?;

        debug!("Synthesized {} bytes of audio", output.audio.len());
        Ok(output.audio)
    }

    /// One interactive voice turn: transcript, answer and spoken reply.
    pub async fn converse(&self, audio_path: impl AsRef<Path>) -> ConverseResult {
        let ws = |e| ServiceFailure::new(Transport::WebSocket, e);
        let pcm = load_audio_file(audio_path.as_ref()).await.map_err(ws)?;

        let output = self
            .session(&self.config.endpoints.interactive_url)
            .run(
                SessionRequest::Converse {
                    pcm,
                    uid: Uuid::new_v4().simple().to_string(),
                    voice: Some(VoiceSettings::new(self.config.default_voice.clone())),
                },
                self.deadline(),
            )
            .await
            .map_err(ws)?;

        Ok(ConversationTurn {
            transcript: output.transcript.trim().to_string(),
            answer: output.answer,
            audio: output.audio,
        })
    }

    // =========================================================================
    // Language model
    // =========================================================================

    /// Ask the language model within a conversation.
    ///
    /// The prompt is recorded before the call and the reply after it, so a
    /// failed call leaves the prompt in the history.
    pub async fn chat(&self, conversation_id: &str, prompt: &str) -> DialogueResult {
        if prompt.trim().is_empty() {
            let transport = if self.selector.has_primary() {
                Transport::Http
            } else {
                Transport::WebSocket
            };
            return Err(ServiceFailure::new(
                transport,
                GatewayError::InvalidInput("Prompt must not be empty".to_string()),
            ));
        }

        self.context.add(conversation_id, Role::User, prompt).await;
        let messages = self.context.get(conversation_id).await;
        debug!(
            "Conversation {} has {} message(s) in context",
            conversation_id,
            messages.len()
        );

        match self.selector.ask(&messages, self.deadline()).await {
            Ok(reply) => {
                self.context
                    .add(conversation_id, Role::Assistant, &reply.text)
                    .await;
                Ok(reply)
            }
            Err(failure) => {
                warn!(
                    "Chat for conversation {} failed via {}: {}",
                    conversation_id, failure.transport, failure.error
                );
                Err(failure)
            }
        }
    }

    /// Ask a question about an image.
    pub async fn analyze_image(&self, image_path: impl AsRef<Path>, question: &str) -> DialogueResult {
        let ws = |e| ServiceFailure::new(Transport::WebSocket, e);

        if question.trim().is_empty() {
            return Err(ws(GatewayError::InvalidInput(
                "Question must not be empty".to_string(),
            )));
        }
        let image = read_image(image_path.as_ref()).await.map_err(ws)?;

        let output = self
            .session(&self.config.endpoints.image_url)
            .run(
                SessionRequest::Chat {
                    parameters: ChatParameters::new(IMAGE_DOMAIN),
                    messages: vec![
                        ChatMessage::image(BASE64.encode(&image)),
                        ChatMessage::user(question),
                    ],
                },
                self.deadline(),
            )
            .await
            .map_err(ws)?;

        Ok(DialogueReply {
            text: output.answer,
            transport: Transport::WebSocket,
        })
    }

    /// Classify the facial expression in an image.
    pub async fn analyze_face_expression(&self, image_path: impl AsRef<Path>) -> FaceExpressionResult {
        let http = |e| ServiceFailure::new(Transport::Http, e);

        let client = self.face.as_ref().ok_or_else(|| {
            http(GatewayError::AuthError(
                "Face expression API credentials are not configured".to_string(),
            ))
        })?;
        let path = image_path.as_ref();
        let image = read_image(path).await.map_err(http)?;
        let image_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image");

        client
            .analyze(image_name, image, self.deadline())
            .await
            .map_err(http)
    }

    /// Forget a conversation's history.
    pub async fn clear_conversation(&self, conversation_id: &str) {
        self.context.clear(conversation_id).await;
        info!("Cleared conversation {}", conversation_id);
    }
}

/// Lower-case and check a recognition language code.
pub fn normalize_language(language: &str) -> GatewayResult<String> {
    let normalized = language.trim().to_ascii_lowercase();
    if SUPPORTED_LANGUAGES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(GatewayError::InvalidInput(format!(
            "Unsupported language '{language}', expected one of {SUPPORTED_LANGUAGES:?}"
        )))
    }
}

async fn read_image(path: &Path) -> GatewayResult<Vec<u8>> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        GatewayError::InvalidInput(format!("Cannot read image file {}: {e}", path.display()))
    })?;
    if data.is_empty() {
        return Err(GatewayError::InvalidInput("Image file is empty".to_string()));
    }
    if data.len() > MAX_AUDIO_BYTES {
        return Err(GatewayError::InvalidInput(format!(
            "Image file too large: {} bytes",
            data.len()
        )));
    }
    Ok(data)
}
