//! Mock Spark providers for integration tests
//!
//! - WebSocket: a scripted signed-endpoint server that records every frame
//! - HTTP: wiremock helpers for the streaming chat-completion endpoint
//!
//! Also holds builders for inbound protocol messages and a test configuration
//! pointing every endpoint at the mocks.

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod http_mock;
pub mod websocket_mock;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use spark_gateway::{Credentials, GatewayConfig};

/// Request counters shared by the mocks
#[derive(Debug, Default)]
pub struct MockStats {
    pub connections: AtomicU64,
    pub frames: AtomicU64,
    pub client_closes: AtomicU64,
}

impl MockStats {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn client_closes(&self) -> u64 {
        self.client_closes.load(Ordering::SeqCst)
    }
}

/// Route gateway logs to the test harness output; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn b64(data: impl AsRef<[u8]>) -> String {
    BASE64.encode(data)
}

// =============================================================================
// Inbound message builders
// =============================================================================

/// `{"header":{"code":0,...},"payload":{...}}`
pub fn ok_message(status: i64, payload: Value) -> String {
    json!({
        "header": {"code": 0, "message": "success", "sid": "mock-sid", "status": status},
        "payload": payload,
    })
    .to_string()
}

pub fn error_message(code: i64, message: &str) -> String {
    json!({
        "header": {"code": code, "message": message, "sid": "mock-sid", "status": 2},
    })
    .to_string()
}

/// Recognition result in the short-form word-document layout.
pub fn recognition_result(words: &[&str], status: i64) -> String {
    let ws: Vec<Value> = words.iter().map(|w| json!({"cw": [{"w": w}]})).collect();
    let doc = json!({"sn": 1, "ls": status == 2, "ws": ws}).to_string();
    ok_message(status, json!({"result": {"text": b64(doc), "status": status}}))
}

pub fn interactive_iat(text: &str, status: i64) -> String {
    ok_message(1, json!({"iat": {"text": b64(text), "status": status}}))
}

pub fn interactive_nlp(text: &str, status: i64) -> String {
    ok_message(1, json!({"nlp": {"text": b64(text), "status": status}}))
}

pub fn interactive_tts(audio: &[u8], status: i64) -> String {
    ok_message(1, json!({"tts": {"audio": b64(audio), "status": status}}))
}

pub fn synthesis_audio(audio: &[u8], status: i64) -> String {
    ok_message(status, json!({"audio": {"audio": b64(audio), "status": status}}))
}

pub fn chat_choices(content: &str, status: i64) -> String {
    ok_message(
        status,
        json!({"choices": {"status": status, "seq": 0, "text": [{"content": content, "role": "assistant", "index": 0}]}}),
    )
}

// =============================================================================
// Configuration
// =============================================================================

pub fn test_credentials(api_password: Option<&str>) -> Credentials {
    Credentials::new(
        "mock-app",
        "mock-key",
        "mock-secret",
        api_password.map(str::to_string),
    )
}

/// Configuration with every WebSocket endpoint on `ws_base` (e.g. `ws://127.0.0.1:1234`).
pub fn test_config(ws_base: &str, http_url: &str, api_password: Option<&str>) -> GatewayConfig {
    let mut config = GatewayConfig::new(test_credentials(api_password));
    config.endpoints.recognition_url = format!("{ws_base}/v1");
    config.endpoints.interactive_url = format!("{ws_base}/v1/openapi/chat");
    config.endpoints.synthesis_url = format!("{ws_base}/v1/private/tts");
    config.endpoints.chat_ws_url = format!("{ws_base}/v4.0/chat");
    config.endpoints.image_url = format!("{ws_base}/v2.1/image");
    config.endpoints.chat_http_url = http_url.to_string();
    config.timeouts.frame_interval = Duration::from_millis(5);
    config.timeouts.call = Duration::from_secs(10);
    config.timeouts.connect = Duration::from_secs(5);
    config.timeouts.drain = Duration::from_secs(2);
    config
}
