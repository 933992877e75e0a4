//! Configuration validation logic.

use url::Url;

use super::{ConfigError, Credentials, Endpoints, FaceCredentials, Timeouts};

pub(super) fn validate_credentials(credentials: &Credentials) -> Result<(), ConfigError> {
    for (name, value) in [
        ("app_id", &credentials.app_id),
        ("api_key", &credentials.api_key),
        ("api_secret", &credentials.api_secret),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Missing(name.to_string()));
        }
    }
    Ok(())
}

pub(super) fn validate_face_credentials(face: &FaceCredentials) -> Result<(), ConfigError> {
    for (name, value) in [("face_app_id", &face.app_id), ("face_api_key", &face.api_key)] {
        if value.trim().is_empty() {
            return Err(ConfigError::Missing(name.to_string()));
        }
    }
    Ok(())
}

pub(super) fn validate_endpoints(endpoints: &Endpoints) -> Result<(), ConfigError> {
    let websocket = [
        ("recognition_url", &endpoints.recognition_url),
        ("interactive_url", &endpoints.interactive_url),
        ("synthesis_url", &endpoints.synthesis_url),
        ("chat_ws_url", &endpoints.chat_ws_url),
        ("image_url", &endpoints.image_url),
    ];
    for (name, value) in websocket {
        validate_url(name, value, &["ws", "wss"])?;
    }
    validate_url("chat_http_url", &endpoints.chat_http_url, &["http", "https"])?;
    validate_url(
        "face_expression_url",
        &endpoints.face_expression_url,
        &["http", "https"],
    )
}

fn validate_url(name: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("{value}: {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("scheme must be one of {schemes:?}, got {}", url.scheme()),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{value} has no host"),
        });
    }
    Ok(())
}

pub(super) fn validate_limits(context_budget: usize, timeouts: &Timeouts) -> Result<(), ConfigError> {
    if context_budget == 0 {
        return Err(ConfigError::InvalidValue {
            name: "context_budget".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if timeouts.call.is_zero() || timeouts.connect.is_zero() {
        return Err(ConfigError::InvalidValue {
            name: "timeouts".to_string(),
            message: "connect and call timeouts must be greater than zero".to_string(),
        });
    }
    Ok(())
}
