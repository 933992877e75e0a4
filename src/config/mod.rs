//! Configuration module for the Spark gateway
//!
//! This module loads credentials, endpoints, budgets and timeouts from
//! `.env` files, environment variables and YAML files.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use spark_gateway::config::GatewayConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = GatewayConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = GatewayConfig::from_file(&PathBuf::from("gateway.yaml"))?;
//! println!("Recognition endpoint: {}", config.endpoints.recognition_url);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroize;

use crate::core::context::DEFAULT_CONTEXT_BUDGET;
use crate::core::session::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_FRAME_INTERVAL};

mod env;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_RECOGNITION_URL: &str = "ws://iat.xf-yun.com/v1";
pub const DEFAULT_INTERACTIVE_URL: &str = "ws://sparkos.xfyun.cn/v1/openapi/chat";
pub const DEFAULT_SYNTHESIS_URL: &str = "wss://cbm01.cn-huabei-1.xf-yun.com/v1/private/mcd9m97e6";
pub const DEFAULT_CHAT_WS_URL: &str = "wss://spark-api.xf-yun.com/v4.0/chat";
pub const DEFAULT_IMAGE_URL: &str = "wss://spark-api.cn-huabei-1.xf-yun.com/v2.1/image";
pub const DEFAULT_CHAT_HTTP_URL: &str = "https://spark-api-open.xf-yun.com/v1/chat/completions";
pub const DEFAULT_FACE_EXPRESSION_URL: &str = "http://tupapi.xfyun.cn/v1/expression";

pub const DEFAULT_CHAT_MODEL: &str = "4.0Ultra";
pub const DEFAULT_CHAT_DOMAIN: &str = "4.0Ultra";
pub const DEFAULT_CHAT_USER: &str = "spark-gateway";
pub const DEFAULT_VOICE: &str = "x5_lingxiaoyue_flow";

/// Per-call deadline applied by the facade.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),
}

// =============================================================================
// Credentials
// =============================================================================

/// Spark application credentials.
///
/// Shared read-only behind an `Arc`; secrets are wiped on drop and never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
    /// Bearer token of the HTTP chat endpoint
    pub api_password: Option<String>,
}

impl Credentials {
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_password: Option<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_password,
        }
    }

    pub fn has_http_password(&self) -> bool {
        self.api_password
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field(
                "api_password",
                &self.api_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Zeroize secrets when credentials are dropped.
impl Drop for Credentials {
    fn drop(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
        if let Some(ref mut password) = self.api_password {
            password.zeroize();
        }
    }
}

/// Credentials of the face-feature HTTP API, issued separately from the Spark ones.
#[derive(Clone, PartialEq, Eq)]
pub struct FaceCredentials {
    pub app_id: String,
    pub api_key: String,
}

impl FaceCredentials {
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for FaceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl Drop for FaceCredentials {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Remote endpoints, one per capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub recognition_url: String,
    pub interactive_url: String,
    pub synthesis_url: String,
    pub chat_ws_url: String,
    pub image_url: String,
    pub chat_http_url: String,
    pub face_expression_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            recognition_url: DEFAULT_RECOGNITION_URL.to_string(),
            interactive_url: DEFAULT_INTERACTIVE_URL.to_string(),
            synthesis_url: DEFAULT_SYNTHESIS_URL.to_string(),
            chat_ws_url: DEFAULT_CHAT_WS_URL.to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
            chat_http_url: DEFAULT_CHAT_HTTP_URL.to_string(),
            face_expression_url: DEFAULT_FACE_EXPRESSION_URL.to_string(),
        }
    }
}

/// Language-model call settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    /// `model` of the HTTP endpoint
    pub model: String,
    /// `parameter.chat.domain` of the WebSocket endpoint
    pub domain: String,
    /// `user` of the HTTP endpoint
    pub user: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            domain: DEFAULT_CHAT_DOMAIN.to_string(),
            user: DEFAULT_CHAT_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub drain: Duration,
    /// Deadline of one facade call, fallback included
    pub call: Duration,
    pub frame_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            drain: DEFAULT_DRAIN_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub credentials: Credentials,
    /// Face-feature API credentials; face expression analysis is unavailable without them
    pub face: Option<FaceCredentials>,
    pub endpoints: Endpoints,
    pub chat: ChatSettings,
    pub default_voice: String,
    /// Character budget of one conversation
    pub context_budget: usize,
    pub timeouts: Timeouts,
}

impl GatewayConfig {
    /// Configuration with the given credentials and defaults for everything else.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            face: None,
            endpoints: Endpoints::default(),
            chat: ChatSettings::default(),
            default_voice: DEFAULT_VOICE.to_string(),
            context_budget: DEFAULT_CONTEXT_BUDGET,
            timeouts: Timeouts::default(),
        }
    }

    /// Load configuration from `.env` and environment variables.
    ///
    /// Actual environment variables take precedence over `.env` values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = env::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of the environment.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load()?;
        yaml_config.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Check credentials, endpoint schemes and numeric bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_credentials(&self.credentials)?;
        if let Some(face) = &self.face {
            validation::validate_face_credentials(face)?;
        }
        validation::validate_endpoints(&self.endpoints)?;
        validation::validate_limits(self.context_budget, &self.timeouts)?;
        Ok(())
    }
}
