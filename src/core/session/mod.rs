//! Streaming sessions over signed Spark WebSocket endpoints.
//!
//! Recognition, interactive dialogue, synthesis and text-mode chat are
//! capability profiles of a single state machine:
//!
//! - [`messages`]: inbound envelope parsing and channel tagging
//! - [`profile`]: per-capability outbound envelopes and termination rules
//! - [`assembler`]: fragment decoding into transcript, answer and audio
//! - [`client`]: the `StreamingSession` sender/receiver state machine

pub mod assembler;
pub mod client;
pub mod messages;
pub mod profile;


pub use assembler::{ResultAssembler, SessionOutput};
pub use client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_FRAME_INTERVAL, SessionSettings,
    SessionState, StreamingSession,
};
pub use messages::{Channel, Fragment, FragmentBody, ProtocolMessage};
pub use profile::{
    Capability, ChatParameters, DEFAULT_INTERACTIVE_VOICE, IMAGE_DOMAIN, OutboundFrame,
    SessionRequest, VoiceSettings,
};
