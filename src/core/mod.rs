pub mod audio;
pub mod chat;
pub mod context;
pub mod face;
pub mod gateway;
pub mod session;
pub mod signer;

// Re-export commonly used types for convenience
pub use audio::{AudioFormat, AudioFrame, FRAME_CHUNK_SIZE, FrameStatus, frame_audio, load_audio_file};

pub use chat::{
    ChatBackend, DialogueReply, HttpChatBackend, SseLineParser, StreamEvent, TransportSelector,
    WebSocketChatBackend,
};

pub use context::{ChatMessage, ContextStore, DEFAULT_CONTEXT_BUDGET, InMemoryContextStore, Role};

pub use face::{FaceExpression, FaceExpressionClient};

pub use gateway::{
    AiGateway, ConversationTurn, ConverseResult, DialogueResult, FaceExpressionResult,
    RecognitionResult, SynthesisResult,
};

pub use session::{
    Capability, Channel, SessionOutput, SessionRequest, SessionSettings, SessionState,
    StreamingSession, VoiceSettings,
};

pub use signer::{SignedRequest, sign, sign_at};
