use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{ConfigError, FaceCredentials, GatewayConfig};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override the environment.
///
/// # Example YAML structure
/// ```yaml
/// credentials:
///   app_id: "your-app-id"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///   api_password: "your-http-api-password"
///
/// endpoints:
///   recognition_url: "ws://iat.xf-yun.com/v1"
///   interactive_url: "ws://sparkos.xfyun.cn/v1/openapi/chat"
///   synthesis_url: "wss://cbm01.cn-huabei-1.xf-yun.com/v1/private/mcd9m97e6"
///   chat_ws_url: "wss://spark-api.xf-yun.com/v4.0/chat"
///   image_url: "wss://spark-api.cn-huabei-1.xf-yun.com/v2.1/image"
///   chat_http_url: "https://spark-api-open.xf-yun.com/v1/chat/completions"
///   face_expression_url: "http://tupapi.xfyun.cn/v1/expression"
///
/// face:
///   app_id: "your-face-app-id"
///   api_key: "your-face-api-key"
///
/// chat:
///   model: "4.0Ultra"
///   domain: "4.0Ultra"
///   user: "interview-assistant"
///
/// voice:
///   default: "x5_lingxiaoyue_flow"
///
/// context:
///   budget: 11000
///
/// timeouts:
///   connect_secs: 10
///   drain_secs: 5
///   call_secs: 60
///   frame_interval_ms: 40
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub credentials: Option<CredentialsYaml>,
    pub face: Option<FaceYaml>,
    pub endpoints: Option<EndpointsYaml>,
    pub chat: Option<ChatYaml>,
    pub voice: Option<VoiceYaml>,
    pub context: Option<ContextYaml>,
    pub timeouts: Option<TimeoutsYaml>,
}

/// Credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsYaml {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_password: Option<String>,
}

/// Face-feature API credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FaceYaml {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
}

/// Endpoint overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EndpointsYaml {
    pub recognition_url: Option<String>,
    pub interactive_url: Option<String>,
    pub synthesis_url: Option<String>,
    pub chat_ws_url: Option<String>,
    pub image_url: Option<String>,
    pub chat_http_url: Option<String>,
    pub face_expression_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChatYaml {
    pub model: Option<String>,
    pub domain: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ContextYaml {
    pub budget: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub connect_secs: Option<u64>,
    pub drain_secs: Option<u64>,
    pub call_secs: Option<u64>,
    pub frame_interval_ms: Option<u64>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override `config` with every value present in this file.
    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(creds) = self.credentials {
            set(&mut config.credentials.app_id, creds.app_id);
            set(&mut config.credentials.api_key, creds.api_key);
            set(&mut config.credentials.api_secret, creds.api_secret);
            if creds.api_password.is_some() {
                config.credentials.api_password = creds.api_password;
            }
        }

        if let Some(face) = self.face {
            let target = config
                .face
                .get_or_insert_with(|| FaceCredentials::new("", ""));
            set(&mut target.app_id, face.app_id);
            set(&mut target.api_key, face.api_key);
        }

        if let Some(endpoints) = self.endpoints {
            let target = &mut config.endpoints;
            set(&mut target.recognition_url, endpoints.recognition_url);
            set(&mut target.interactive_url, endpoints.interactive_url);
            set(&mut target.synthesis_url, endpoints.synthesis_url);
            set(&mut target.chat_ws_url, endpoints.chat_ws_url);
            set(&mut target.image_url, endpoints.image_url);
            set(&mut target.chat_http_url, endpoints.chat_http_url);
            set(&mut target.face_expression_url, endpoints.face_expression_url);
        }

        if let Some(chat) = self.chat {
            set(&mut config.chat.model, chat.model);
            set(&mut config.chat.domain, chat.domain);
            set(&mut config.chat.user, chat.user);
        }

        if let Some(voice) = self.voice {
            set(&mut config.default_voice, voice.default);
        }

        if let Some(context) = self.context {
            set(&mut config.context_budget, context.budget);
        }

        if let Some(timeouts) = self.timeouts {
            let target = &mut config.timeouts;
            set(&mut target.connect, timeouts.connect_secs.map(Duration::from_secs));
            set(&mut target.drain, timeouts.drain_secs.map(Duration::from_secs));
            set(&mut target.call, timeouts.call_secs.map(Duration::from_secs));
            set(
                &mut target.frame_interval,
                timeouts.frame_interval_ms.map(Duration::from_millis),
            );
        }
    }
}
