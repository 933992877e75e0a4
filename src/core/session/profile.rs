//! Capability profiles of the streaming session.
//!
//! Recognition, interactive dialogue, synthesis and text chat all run on the
//! same session state machine. A [`SessionRequest`] carries the call's input;
//! its [`Capability`] decides how outbound envelopes are built, which inbound
//! channels are assembled and which final status ends the exchange.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::{Value, json};

use super::messages::Channel;
use crate::core::audio::{AudioFormat, AudioFrame, FrameStatus, frame_audio};
use crate::core::context::ChatMessage;
use crate::errors::{GatewayError, GatewayResult};

/// Default voice of the interactive endpoint.
pub const DEFAULT_INTERACTIVE_VOICE: &str = "x5_lingxiaoyue_flow";

/// Chat domain of the image-understanding endpoint.
pub const IMAGE_DOMAIN: &str = "imagev3";

/// What a session is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Speech to text only
    Recognition,
    /// Speech in, transcript + answer + synthesized reply out
    Interactive { speak: bool },
    /// Text to speech
    Synthesis,
    /// Text-mode chat (also used for image understanding)
    Chat,
}

impl Capability {
    /// Channels whose fragments are assembled; others are logged and ignored.
    pub fn accepts(self, channel: Channel) -> bool {
        match self {
            Capability::Recognition => channel == Channel::Recognition,
            Capability::Interactive { speak } => match channel {
                Channel::Recognition | Channel::Dialogue | Channel::Event => true,
                Channel::Synthesis => speak,
            },
            Capability::Synthesis => channel == Channel::Synthesis,
            Capability::Chat => channel == Channel::Dialogue,
        }
    }

    /// Channel whose final fragment ends the exchange.
    pub fn terminal_channel(self) -> Channel {
        match self {
            Capability::Recognition => Channel::Recognition,
            Capability::Interactive { speak: true } => Channel::Synthesis,
            Capability::Interactive { speak: false } => Channel::Dialogue,
            Capability::Synthesis => Channel::Synthesis,
            Capability::Chat => Channel::Dialogue,
        }
    }

    /// Whether a top-level `header.status == 2` also ends the exchange.
    ///
    /// The interactive endpoint reports per-channel completion only.
    pub fn finishes_on_header_status(self) -> bool {
        !matches!(self, Capability::Interactive { .. })
    }
}

/// Voice parameters for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub vcn: String,
    pub speed: u8,
    pub volume: u8,
    pub pitch: u8,
    /// Output audio encoding (`lame` for mp3, `raw` for PCM)
    pub encoding: String,
}

impl VoiceSettings {
    pub fn new(vcn: impl Into<String>) -> Self {
        Self {
            vcn: vcn.into(),
            ..Default::default()
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            vcn: DEFAULT_INTERACTIVE_VOICE.to_string(),
            speed: 50,
            volume: 50,
            pitch: 50,
            encoding: "lame".to_string(),
        }
    }
}

/// Sampling parameters of the text-mode chat profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatParameters {
    pub domain: String,
    pub temperature: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl ChatParameters {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            temperature: 0.5,
            top_k: 4,
            max_tokens: 2028,
        }
    }
}

/// Input of one streaming call.
#[derive(Debug, Clone)]
pub enum SessionRequest {
    Recognize {
        pcm: Bytes,
        language: String,
    },
    Converse {
        pcm: Bytes,
        /// Constant for the whole call
        uid: String,
        /// `None` disables the synthesis channel
        voice: Option<VoiceSettings>,
    },
    Synthesize {
        text: String,
        voice: VoiceSettings,
    },
    Chat {
        parameters: ChatParameters,
        messages: Vec<ChatMessage>,
    },
}

/// One serialized envelope ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub status: FrameStatus,
    pub text: String,
    /// Audio frames are paced; text envelopes are sent at once
    pub paced: bool,
}

impl SessionRequest {
    pub fn capability(&self) -> Capability {
        match self {
            SessionRequest::Recognize { .. } => Capability::Recognition,
            SessionRequest::Converse { voice, .. } => Capability::Interactive {
                speak: voice.is_some(),
            },
            SessionRequest::Synthesize { .. } => Capability::Synthesis,
            SessionRequest::Chat { .. } => Capability::Chat,
        }
    }

    /// Build every outbound envelope of the call, in send order.
    pub fn outbound_frames(
        &self,
        app_id: &str,
        stmid: &str,
        chunk_size: usize,
    ) -> GatewayResult<Vec<OutboundFrame>> {
        match self {
            SessionRequest::Recognize { pcm, language } => {
                Ok(frame_audio(pcm, chunk_size, AudioFormat::default())
                    .iter()
                    .map(|frame| audio_envelope(recognition_envelope(app_id, language, frame), frame))
                    .collect())
            }
            SessionRequest::Converse { pcm, uid, voice } => {
                Ok(frame_audio(pcm, chunk_size, AudioFormat::default())
                    .iter()
                    .map(|frame| {
                        audio_envelope(
                            interactive_envelope(app_id, uid, stmid, voice.as_ref(), frame),
                            frame,
                        )
                    })
                    .collect())
            }
            SessionRequest::Synthesize { text, voice } => {
                if text.trim().is_empty() {
                    return Err(GatewayError::InvalidInput(
                        "Synthesis text must not be empty".to_string(),
                    ));
                }
                Ok(vec![text_envelope(synthesis_envelope(app_id, text, voice))])
            }
            SessionRequest::Chat {
                parameters,
                messages,
            } => {
                if messages.is_empty() {
                    return Err(GatewayError::InvalidInput(
                        "Chat requires at least one message".to_string(),
                    ));
                }
                Ok(vec![text_envelope(chat_envelope(app_id, parameters, messages))])
            }
        }
    }
}

fn audio_envelope(value: Value, frame: &AudioFrame) -> OutboundFrame {
    OutboundFrame {
        status: frame.status,
        text: value.to_string(),
        paced: true,
    }
}

fn text_envelope(value: Value) -> OutboundFrame {
    OutboundFrame {
        status: FrameStatus::Last,
        text: value.to_string(),
        paced: false,
    }
}

// =============================================================================
// Envelope builders
// =============================================================================

fn recognition_envelope(app_id: &str, language: &str, frame: &AudioFrame) -> Value {
    json!({
        "header": {
            "app_id": app_id,
            "status": frame.status.as_code(),
        },
        "parameter": {
            "iat": {
                "domain": "slm",
                "language": language,
                "accent": "mandarin",
                "dwa": "wpgs",
                "result": {
                    "encoding": "utf8",
                    "compress": "raw",
                    "format": "plain",
                },
            },
        },
        "payload": {
            "audio": {
                "audio": BASE64.encode(&frame.payload),
                "sample_rate": frame.format.sample_rate,
                "channels": frame.format.channels,
                "bit_depth": frame.format.bit_depth,
                "encoding": frame.format.encoding,
                "status": frame.status.as_code(),
            },
        },
    })
}

fn interactive_envelope(
    app_id: &str,
    uid: &str,
    stmid: &str,
    voice: Option<&VoiceSettings>,
    frame: &AudioFrame,
) -> Value {
    // The interactive header only distinguishes the opening frame.
    let header_status = match frame.status {
        FrameStatus::First => 0,
        _ => 1,
    };

    let mut parameter = json!({
        "iat": {
            "iat": {"encoding": "utf8", "compress": "raw", "format": "json"},
        },
        "nlp": {
            "nlp": {"encoding": "utf8", "compress": "raw", "format": "plain"},
            "new_session": "global",
        },
    });
    if let Some(voice) = voice {
        parameter["tts"] = json!({
            "vcn": voice.vcn,
            "speed": voice.speed,
            "volume": voice.volume,
            "pitch": voice.pitch,
            "tts": {
                "encoding": voice.encoding,
                "sample_rate": 16000,
                "channels": 1,
                "bit_depth": 16,
                "frame_size": 0,
            },
        });
    }

    json!({
        "header": {
            "app_id": app_id,
            "uid": uid,
            "status": header_status,
            "stmid": stmid,
            "scene": "sos_app",
            "interact_mode": "continuous_vad",
        },
        "parameter": parameter,
        "payload": {
            "audio": {
                "status": frame.status.as_code(),
                "audio": BASE64.encode(&frame.payload),
                "encoding": frame.format.encoding,
                "sample_rate": frame.format.sample_rate,
                "channels": frame.format.channels,
                "bit_depth": frame.format.bit_depth,
                "frame_size": 0,
            },
        },
    })
}

fn synthesis_envelope(app_id: &str, text: &str, voice: &VoiceSettings) -> Value {
    json!({
        "header": {
            "app_id": app_id,
            "status": FrameStatus::Last.as_code(),
        },
        "parameter": {
            "tts": {
                "vcn": voice.vcn,
                "speed": voice.speed,
                "volume": voice.volume,
                "pitch": voice.pitch,
                "audio": {
                    "encoding": voice.encoding,
                    "sample_rate": 24000,
                    "channels": 1,
                    "bit_depth": 16,
                    "frame_size": 0,
                },
            },
        },
        "payload": {
            "text": {
                "encoding": "utf8",
                "compress": "raw",
                "format": "plain",
                "status": FrameStatus::Last.as_code(),
                "seq": 0,
                "text": BASE64.encode(text.as_bytes()),
            },
        },
    })
}

fn chat_envelope(app_id: &str, parameters: &ChatParameters, messages: &[ChatMessage]) -> Value {
    json!({
        "header": {
            "app_id": app_id,
        },
        "parameter": {
            "chat": {
                "domain": parameters.domain,
                "temperature": parameters.temperature,
                "top_k": parameters.top_k,
                "max_tokens": parameters.max_tokens,
                "auditing": "default",
            },
        },
        "payload": {
            "message": {
                "text": messages,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(frame: &OutboundFrame) -> Value {
        serde_json::from_str(&frame.text).unwrap()
    }

    #[test]
    fn test_recognition_frames_carry_status_in_header_and_payload() {
        let request = SessionRequest::Recognize {
            pcm: Bytes::from(vec![0u8; 3200]),
            language: "zh_cn".to_string(),
        };
        let frames = request.outbound_frames("app", "1", 1280).unwrap();
        assert_eq!(frames.len(), 3);

        for (frame, expected) in frames.iter().zip([0, 1, 2]) {
            let value = parse(frame);
            assert_eq!(value["header"]["status"], expected);
            assert_eq!(value["payload"]["audio"]["status"], expected);
            assert_eq!(value["header"]["app_id"], "app");
            assert_eq!(value["parameter"]["iat"]["language"], "zh_cn");
            assert_eq!(value["payload"]["audio"]["sample_rate"], 16000);
            assert_eq!(value["payload"]["audio"]["channels"], 1);
            assert_eq!(value["payload"]["audio"]["bit_depth"], 16);
            assert!(frame.paced);
        }
        let last = parse(&frames[2]);
        let audio = BASE64
            .decode(last["payload"]["audio"]["audio"].as_str().unwrap())
            .unwrap();
        assert_eq!(audio.len(), 640);
    }

    #[test]
    fn test_interactive_frames_keep_session_ids() {
        let request = SessionRequest::Converse {
            pcm: Bytes::from(vec![0u8; 4000]),
            uid: "user-1".to_string(),
            voice: Some(VoiceSettings::default()),
        };
        let frames = request.outbound_frames("app", "1", 1280).unwrap();

        let headers: Vec<Value> = frames.iter().map(|f| parse(f)["header"].clone()).collect();
        assert!(headers.iter().all(|h| h["uid"] == "user-1" && h["stmid"] == "1"));
        assert_eq!(headers[0]["status"], 0);
        assert!(headers[1..].iter().all(|h| h["status"] == 1));

        let first = parse(&frames[0]);
        assert_eq!(first["header"]["scene"], "sos_app");
        assert_eq!(first["parameter"]["tts"]["vcn"], DEFAULT_INTERACTIVE_VOICE);
        assert_eq!(first["parameter"]["nlp"]["new_session"], "global");
        assert_eq!(parse(frames.last().unwrap())["payload"]["audio"]["status"], 2);
    }

    #[test]
    fn test_interactive_without_voice_omits_tts() {
        let request = SessionRequest::Converse {
            pcm: Bytes::from(vec![0u8; 10]),
            uid: "u".to_string(),
            voice: None,
        };
        assert_eq!(
            request.capability().terminal_channel(),
            Channel::Dialogue
        );
        let frames = request.outbound_frames("app", "1", 1280).unwrap();
        assert!(parse(&frames[0])["parameter"].get("tts").is_none());
    }

    #[test]
    fn test_synthesis_is_single_text_envelope() {
        let request = SessionRequest::Synthesize {
            text: "hello".to_string(),
            voice: VoiceSettings::new("x4_xiaoyan"),
        };
        let frames = request.outbound_frames("app", "1", 1280).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].paced);

        let value = parse(&frames[0]);
        assert_eq!(value["header"]["status"], 2);
        assert_eq!(value["parameter"]["tts"]["vcn"], "x4_xiaoyan");
        assert_eq!(value["payload"]["text"]["text"], BASE64.encode("hello"));
    }

    #[test]
    fn test_empty_synthesis_text_rejected() {
        let request = SessionRequest::Synthesize {
            text: "  ".to_string(),
            voice: VoiceSettings::default(),
        };
        assert!(matches!(
            request.outbound_frames("app", "1", 1280),
            Err(GatewayError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_chat_envelope_embeds_messages() {
        let request = SessionRequest::Chat {
            parameters: ChatParameters::new(IMAGE_DOMAIN),
            messages: vec![ChatMessage::image("aW1n"), ChatMessage::user("what is this?")],
        };
        let frames = request.outbound_frames("app", "1", 1280).unwrap();
        let value = parse(&frames[0]);

        assert_eq!(value["parameter"]["chat"]["domain"], "imagev3");
        assert_eq!(value["parameter"]["chat"]["max_tokens"], 2028);
        let text = value["payload"]["message"]["text"].as_array().unwrap();
        assert_eq!(text[0]["content_type"], "image");
        assert_eq!(text[1]["content"], "what is this?");
    }

    #[test]
    fn test_capability_channel_routing() {
        assert!(Capability::Recognition.accepts(Channel::Recognition));
        assert!(!Capability::Recognition.accepts(Channel::Synthesis));
        assert!(!Capability::Interactive { speak: false }.accepts(Channel::Synthesis));
        assert!(Capability::Interactive { speak: true }.accepts(Channel::Synthesis));
        assert!(!Capability::Interactive { speak: true }.finishes_on_header_status());
        assert!(Capability::Chat.finishes_on_header_status());
    }
}
