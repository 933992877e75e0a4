//! Spark WebSocket message types.
//!
//! Outbound envelopes are built per capability in [`super::profile`]. This
//! module parses inbound envelopes into a [`ProtocolMessage`] whose fragments
//! are tagged with the channel they arrived on. The service uses several
//! payload layouts for the same logical channel:
//!
//! | Payload key       | Channel     | Body                          |
//! |-------------------|-------------|-------------------------------|
//! | `iat.text`        | Recognition | base64 UTF-8 (plain or words) |
//! | `result.text`     | Recognition | base64 word JSON              |
//! | `nlp.text`        | Dialogue    | base64 UTF-8                  |
//! | `choices.text[]`  | Dialogue    | raw text                      |
//! | `tts.audio`       | Synthesis   | base64 audio                  |
//! | `audio.audio`     | Synthesis   | base64 audio                  |
//! | `event.text`      | Event       | base64 UTF-8                  |

use std::fmt;

use serde::Deserialize;

use crate::errors::{GatewayError, GatewayResult};

/// Status value marking the final fragment of a channel or the final message.
pub const FINAL_STATUS: i64 = 2;

/// Logical sub-stream multiplexed over one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Recognition,
    Dialogue,
    Synthesis,
    Event,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Recognition => "recognition",
            Channel::Dialogue => "dialogue",
            Channel::Synthesis => "synthesis",
            Channel::Event => "event",
        };
        f.write_str(name)
    }
}

/// Encoded content of one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentBody {
    /// Base64 of UTF-8 text, possibly a recognition word-JSON document
    Base64Text(String),
    /// Base64 of binary audio
    Base64Audio(String),
    /// Text that needs no decoding
    Raw(String),
}

/// One channel's contribution to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub channel: Channel,
    pub body: FragmentBody,
    pub status: Option<i64>,
}

impl Fragment {
    pub fn is_final(&self) -> bool {
        self.status == Some(FINAL_STATUS)
    }
}

/// Parsed inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// 0 on success, anything else is terminal
    pub code: i64,
    pub message: Option<String>,
    pub sid: Option<String>,
    /// Top-level `header.status`
    pub status: Option<i64>,
    pub fragments: Vec<Fragment>,
}

impl ProtocolMessage {
    pub fn parse(text: &str) -> GatewayResult<Self> {
        let envelope: InboundEnvelope = serde_json::from_str(text)
            .map_err(|e| GatewayError::DecodeError(format!("Invalid inbound message: {e}")))?;
        Ok(envelope.into())
    }

    pub fn is_error(&self) -> bool {
        self.code != 0
    }

    pub fn is_final(&self) -> bool {
        self.status == Some(FINAL_STATUS)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundEnvelope {
    header: InboundHeader,
    payload: Option<InboundPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundHeader {
    code: i64,
    message: Option<String>,
    sid: Option<String>,
    status: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundPayload {
    event: Option<TextSection>,
    iat: Option<TextSection>,
    result: Option<TextSection>,
    nlp: Option<TextSection>,
    choices: Option<ChoicesSection>,
    tts: Option<AudioSection>,
    audio: Option<AudioSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextSection {
    text: Option<String>,
    status: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AudioSection {
    audio: Option<String>,
    status: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChoicesSection {
    status: Option<i64>,
    text: Vec<ChoiceText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChoiceText {
    content: String,
}

impl From<InboundEnvelope> for ProtocolMessage {
    fn from(envelope: InboundEnvelope) -> Self {
        let mut fragments = Vec::new();

        if let Some(payload) = envelope.payload {
            let text = |channel, section: TextSection| Fragment {
                channel,
                body: FragmentBody::Base64Text(section.text.unwrap_or_default()),
                status: section.status,
            };
            let audio = |section: AudioSection| Fragment {
                channel: Channel::Synthesis,
                body: FragmentBody::Base64Audio(section.audio.unwrap_or_default()),
                status: section.status,
            };

            if let Some(section) = payload.event {
                fragments.push(text(Channel::Event, section));
            }
            if let Some(section) = payload.iat {
                fragments.push(text(Channel::Recognition, section));
            }
            if let Some(section) = payload.result {
                fragments.push(text(Channel::Recognition, section));
            }
            if let Some(section) = payload.nlp {
                fragments.push(text(Channel::Dialogue, section));
            }
            if let Some(choices) = payload.choices {
                let content: String = choices.text.into_iter().map(|t| t.content).collect();
                fragments.push(Fragment {
                    channel: Channel::Dialogue,
                    body: FragmentBody::Raw(content),
                    status: choices.status,
                });
            }
            if let Some(section) = payload.tts {
                fragments.push(audio(section));
            }
            if let Some(section) = payload.audio {
                fragments.push(audio(section));
            }
        }

        ProtocolMessage {
            code: envelope.header.code,
            message: envelope.header.message,
            sid: envelope.header.sid,
            status: envelope.header.status,
            fragments,
        }
    }
}
