//! HTTP Mock helpers for the streaming chat-completion endpoint

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CHAT_PATH: &str = "/v1/chat/completions";

/// One `data:` line carrying a content delta.
pub fn delta_line(content: &str) -> String {
    let chunk = serde_json::json!({
        "code": 0,
        "message": "Success",
        "choices": [{"delta": {"role": "assistant", "content": content}, "index": 0}],
    });
    format!("data: {chunk}\n\n")
}

pub fn done_line() -> String {
    "data: [DONE]\n\n".to_string()
}

pub fn chat_url(server: &MockServer) -> String {
    format!("{}{CHAT_PATH}", server.uri())
}

/// Serve `body` as an event stream, expecting exactly `expected_calls` requests.
pub async fn mount_chat_stream(server: &MockServer, body: String, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("authorization", "Bearer mock-password"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Answer every chat request with `status`.
pub async fn mount_chat_status(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(r#"{"error":"mock failure"}"#))
        .expect(expected_calls)
        .mount(server)
        .await;
}
