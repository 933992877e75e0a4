//! Environment variable loading.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::{ConfigError, Credentials, FaceCredentials, GatewayConfig};

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults.
///
/// Credentials may be missing here; a YAML file can still provide them.
pub(super) fn load() -> Result<GatewayConfig, ConfigError> {
    let credentials = Credentials::new(
        var("SPARK_APP_ID").unwrap_or_default(),
        var("SPARK_API_KEY").unwrap_or_default(),
        var("SPARK_API_SECRET").unwrap_or_default(),
        var("SPARK_API_PASSWORD"),
    );
    let mut config = GatewayConfig::new(credentials);

    let (face_app_id, face_api_key) = (var("SPARK_FACE_APP_ID"), var("SPARK_FACE_API_KEY"));
    if face_app_id.is_some() || face_api_key.is_some() {
        config.face = Some(FaceCredentials::new(
            face_app_id.unwrap_or_default(),
            face_api_key.unwrap_or_default(),
        ));
    }

    let endpoints = &mut config.endpoints;
    for (name, slot) in [
        ("SPARK_RECOGNITION_URL", &mut endpoints.recognition_url),
        ("SPARK_INTERACTIVE_URL", &mut endpoints.interactive_url),
        ("SPARK_SYNTHESIS_URL", &mut endpoints.synthesis_url),
        ("SPARK_CHAT_WS_URL", &mut endpoints.chat_ws_url),
        ("SPARK_IMAGE_URL", &mut endpoints.image_url),
        ("SPARK_CHAT_HTTP_URL", &mut endpoints.chat_http_url),
        ("SPARK_FACE_EXPRESSION_URL", &mut endpoints.face_expression_url),
    ] {
        if let Some(value) = var(name) {
            *slot = value;
        }
    }

    if let Some(model) = var("SPARK_CHAT_MODEL") {
        config.chat.model = model;
    }
    if let Some(domain) = var("SPARK_CHAT_DOMAIN") {
        config.chat.domain = domain;
    }
    if let Some(user) = var("SPARK_CHAT_USER") {
        config.chat.user = user;
    }
    if let Some(voice) = var("SPARK_DEFAULT_VOICE") {
        config.default_voice = voice;
    }

    if let Some(budget) = parse::<usize>("SPARK_CONTEXT_BUDGET")? {
        config.context_budget = budget;
    }
    if let Some(secs) = parse::<u64>("SPARK_CONNECT_TIMEOUT_SECS")? {
        config.timeouts.connect = Duration::from_secs(secs);
    }
    if let Some(secs) = parse::<u64>("SPARK_DRAIN_TIMEOUT_SECS")? {
        config.timeouts.drain = Duration::from_secs(secs);
    }
    if let Some(secs) = parse::<u64>("SPARK_CALL_TIMEOUT_SECS")? {
        config.timeouts.call = Duration::from_secs(secs);
    }
    if let Some(ms) = parse::<u64>("SPARK_FRAME_INTERVAL_MS")? {
        config.timeouts.frame_interval = Duration::from_millis(ms);
    }

    Ok(config)
}
