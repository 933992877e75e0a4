//! Turns decoded fragments into the final transcript, answer and audio.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::messages::{Channel, Fragment, FragmentBody};
use super::profile::Capability;
use crate::errors::{GatewayError, GatewayResult};

/// Everything a session produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutput {
    /// Recognized speech
    pub transcript: String,
    /// Generated dialogue text
    pub answer: String,
    /// Synthesized audio, fragments concatenated in arrival order
    pub audio: Bytes,
    /// Remote session id, when the service reported one
    pub sid: Option<String>,
}

/// Recognition word document: `{"ws":[{"cw":[{"w":"..."}]}]}`.
#[derive(Debug, Deserialize)]
struct WordDocument {
    ws: Vec<WordSegment>,
}

#[derive(Debug, Deserialize)]
struct WordSegment {
    #[serde(default)]
    cw: Vec<CandidateWord>,
}

#[derive(Debug, Deserialize)]
struct CandidateWord {
    #[serde(default)]
    w: String,
}

/// Per-call accumulator of channel fragments.
#[derive(Debug)]
pub struct ResultAssembler {
    capability: Capability,
    transcript: String,
    answer: String,
    audio: Vec<Bytes>,
    sid: Option<String>,
}

impl ResultAssembler {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            transcript: String::new(),
            answer: String::new(),
            audio: Vec::new(),
            sid: None,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn set_sid(&mut self, sid: Option<String>) {
        if self.sid.is_none() {
            self.sid = sid;
        }
    }

    /// Apply one fragment.
    ///
    /// Returns `true` when the fragment is the final one of the capability's
    /// terminal channel. A decode failure on a non-final fragment is skipped;
    /// on a final fragment it fails the call.
    pub fn apply(&mut self, fragment: &Fragment) -> GatewayResult<bool> {
        if !self.capability.accepts(fragment.channel) {
            debug!("Ignoring {} fragment", fragment.channel);
            return Ok(false);
        }

        if let Err(e) = self.decode_into(fragment) {
            if fragment.is_final() {
                return Err(GatewayError::ProtocolError {
                    code: -1,
                    channel: Some(fragment.channel),
                    message: format!("Undecodable final fragment: {e}"),
                });
            }
            warn!("Skipping undecodable {} fragment: {}", fragment.channel, e);
        }

        Ok(fragment.is_final() && fragment.channel == self.capability.terminal_channel())
    }

    fn decode_into(&mut self, fragment: &Fragment) -> GatewayResult<()> {
        match (&fragment.body, fragment.channel) {
            (FragmentBody::Base64Text(encoded), Channel::Recognition) => {
                let text = decode_text(encoded)?;
                self.transcript.push_str(&flatten_words(&text));
            }
            (FragmentBody::Base64Text(encoded), Channel::Dialogue) => {
                self.answer.push_str(&decode_text(encoded)?);
            }
            (FragmentBody::Base64Text(encoded), Channel::Event) => {
                info!("Service event: {}", decode_text(encoded)?);
            }
            (FragmentBody::Raw(text), Channel::Dialogue) => {
                self.answer.push_str(text);
            }
            (FragmentBody::Raw(text), Channel::Recognition) => {
                self.transcript.push_str(text);
            }
            (FragmentBody::Base64Audio(encoded), _) => {
                if !encoded.is_empty() {
                    let audio = BASE64.decode(encoded).map_err(|e| {
                        GatewayError::DecodeError(format!("Invalid base64 audio: {e}"))
                    })?;
                    self.audio.push(Bytes::from(audio));
                }
            }
            (body, channel) => {
                return Err(GatewayError::DecodeError(format!(
                    "Unexpected {body:?} on {channel} channel"
                )));
            }
        }
        Ok(())
    }

    pub fn finish(self) -> SessionOutput {
        let mut audio = BytesMut::with_capacity(self.audio.iter().map(Bytes::len).sum());
        for chunk in &self.audio {
            audio.extend_from_slice(chunk);
        }
        SessionOutput {
            transcript: self.transcript,
            answer: self.answer,
            audio: audio.freeze(),
            sid: self.sid,
        }
    }
}

fn decode_text(encoded: &str) -> GatewayResult<String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| GatewayError::DecodeError(format!("Invalid base64 text: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| GatewayError::DecodeError(format!("Invalid UTF-8 text: {e}")))
}

/// Flatten a word document; anything that is not one is plain text.
fn flatten_words(text: &str) -> String {
    match serde_json::from_str::<WordDocument>(text) {
        Ok(doc) => doc
            .ws
            .iter()
            .flat_map(|segment| segment.cw.iter())
            .map(|word| word.w.as_str())
            .collect(),
        Err(_) => text.to_string(),
    }
}
