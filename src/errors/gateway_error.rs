//! Error types shared by every gateway component.
//!
//! Components return [`GatewayError`] internally. The facade wraps it into a
//! [`ServiceFailure`] that also records which transport produced the failure,
//! so the API layer can log the detail and show the user a generic message.

use std::fmt;

use thiserror::Error;

use crate::core::session::Channel;

/// Errors raised while signing, connecting to, or talking with the remote service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials are missing or rejected by the remote service
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The target URL cannot be signed
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// The transport could not be reached or dropped unexpectedly
    #[error("Connection failed: {0}")]
    ConnectError(String),

    /// The HTTP endpoint answered with a non-success status
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The remote service reported a non-zero status code or sent an unusable final frame
    #[error("Protocol error (code {code}{}): {message}", channel_suffix(.channel))]
    ProtocolError {
        code: i64,
        channel: Option<Channel>,
        message: String,
    },

    /// The call deadline expired
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A payload was not valid base64, UTF-8 or JSON
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Caller input was rejected before any remote call was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn channel_suffix(channel: &Option<Channel>) -> String {
    channel.map(|c| format!(", channel {c}")).unwrap_or_default()
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Coarse classification of a [`GatewayError`], used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Connect,
    Protocol,
    Timeout,
    Decode,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Connect => "connect",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Decode => "decode",
            ErrorKind::InvalidInput => "invalid_input",
        };
        f.write_str(name)
    }
}

impl GatewayError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AuthError(_) | GatewayError::MalformedUrl(_) => ErrorKind::Auth,
            GatewayError::ConnectError(_) | GatewayError::HttpStatus { .. } => ErrorKind::Connect,
            GatewayError::ProtocolError { .. } => ErrorKind::Protocol,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::DecodeError(_) => ErrorKind::Decode,
            GatewayError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Remote status code carried by a protocol error, if any.
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            GatewayError::ProtocolError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Transport that produced a result or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Streaming HTTP chat-completion endpoint
    Http,
    /// Signed WebSocket endpoint
    WebSocket,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => f.write_str("http"),
            Transport::WebSocket => f.write_str("websocket"),
        }
    }
}

/// Structured failure returned to callers of the gateway facade.
#[derive(Debug, Error)]
#[error("{transport} transport failed ({}): {error}", .error.kind())]
pub struct ServiceFailure {
    pub transport: Transport,
    #[source]
    pub error: GatewayError,
}

impl ServiceFailure {
    pub fn new(transport: Transport, error: GatewayError) -> Self {
        Self { transport, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Text safe to show an end user; never includes protocol internals.
    pub fn user_message(&self) -> &'static str {
        "service unavailable"
    }
}
