//! HTTP-first chat with WebSocket fallback
//!
//! Uses wiremock for the HTTP endpoint and the scripted WebSocket mock for
//! the fallback.
//!
//! Run with: `cargo test --test chat_fallback`

mod mock_providers;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mock_providers::http_mock::{
    CHAT_PATH, chat_url, delta_line, done_line, mount_chat_status, mount_chat_stream,
};
use mock_providers::websocket_mock::{MockScript, start_websocket_mock};
use mock_providers::{chat_choices, error_message, test_config};
use spark_gateway::{AiGateway, ErrorKind, Transport};

#[tokio::test]
async fn test_http_stream_skips_malformed_line() {
    let server = MockServer::start().await;
    let body = format!("data: {{not json\n\n{}{}", delta_line("你好"), done_line());
    mount_chat_stream(&server, body, 1).await;
    let ws = start_websocket_mock(MockScript::silent()).await;

    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        &chat_url(&server),
        Some("mock-password"),
    ))
    .unwrap();

    let reply = gateway.chat("conv-e", "hello").await.unwrap();
    assert_eq!(reply.text, "你好");
    assert_eq!(reply.transport, Transport::Http);
    assert_eq!(ws.state.stats.connections(), 0);
}

#[tokio::test]
async fn test_http_stream_concatenates_deltas() {
    let server = MockServer::start().await;
    let body = format!(
        "{}{}{}{}",
        delta_line("Rust "),
        delta_line("is "),
        delta_line("fast"),
        done_line()
    );
    mount_chat_stream(&server, body, 1).await;
    let ws = start_websocket_mock(MockScript::silent()).await;

    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        &chat_url(&server),
        Some("mock-password"),
    ))
    .unwrap();

    let reply = gateway.chat("conv", "describe rust").await.unwrap();
    assert_eq!(reply.text, "Rust is fast");
}

#[tokio::test]
async fn test_http_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("authorization", "Bearer mock-password"))
        .and(body_partial_json(json!({
            "model": "4.0Ultra",
            "user": "spark-gateway",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}],
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("{}{}", delta_line("hey"), done_line()), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let ws = start_websocket_mock(MockScript::silent()).await;

    // A "Bearer " prefix in the configured password is not doubled
    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        &chat_url(&server),
        Some("Bearer mock-password"),
    ))
    .unwrap();

    let reply = gateway.chat("conv", "hi").await.unwrap();
    assert_eq!(reply.text, "hey");
}

#[tokio::test]
async fn test_http_failure_falls_back_to_websocket_once() {
    let server = MockServer::start().await;
    mount_chat_status(&server, 500, 1).await;
    let ws = start_websocket_mock(MockScript::after_last(vec![
        chat_choices("from ", 1),
        chat_choices("websocket", 2),
    ]))
    .await;

    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        &chat_url(&server),
        Some("mock-password"),
    ))
    .unwrap();

    let reply = gateway.chat("conv", "hello").await.unwrap();
    assert_eq!(reply.text, "from websocket");
    assert_eq!(reply.transport, Transport::WebSocket);
    assert_eq!(ws.state.stats.connections(), 1);

    let frames = ws.state.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["parameter"]["chat"]["domain"], "4.0Ultra");
    assert_eq!(frames[0]["payload"]["message"]["text"][0]["content"], "hello");
}

#[tokio::test]
async fn test_both_transports_failing_reports_websocket() {
    let server = MockServer::start().await;
    mount_chat_status(&server, 503, 1).await;
    let ws = start_websocket_mock(MockScript::after_first(vec![error_message(
        10013,
        "input content sensitive",
    )]))
    .await;

    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        &chat_url(&server),
        Some("mock-password"),
    ))
    .unwrap();

    let failure = gateway.chat("conv", "hello").await.unwrap_err();
    assert_eq!(failure.transport, Transport::WebSocket);
    assert_eq!(failure.kind(), ErrorKind::Protocol);
    assert_eq!(failure.error.protocol_code(), Some(10013));
    assert_eq!(failure.user_message(), "service unavailable");
    assert_eq!(ws.state.stats.connections(), 1);
}

#[tokio::test]
async fn test_without_password_only_websocket_is_used() {
    let server = MockServer::start().await;
    mount_chat_status(&server, 200, 0).await;
    let ws = start_websocket_mock(MockScript::after_last(vec![chat_choices("ws only", 2)])).await;

    let gateway =
        AiGateway::new(test_config(&ws.base_url(), &chat_url(&server), None)).unwrap();

    let reply = gateway.chat("conv", "hello").await.unwrap();
    assert_eq!(reply.text, "ws only");
    assert_eq!(reply.transport, Transport::WebSocket);
    assert_eq!(ws.state.stats.connections(), 1);
}

#[tokio::test]
async fn test_websocket_fallback_sends_history() {
    let ws = start_websocket_mock(MockScript::after_last(vec![chat_choices("answer", 2)])).await;
    let gateway = AiGateway::new(test_config(
        &ws.base_url(),
        "http://127.0.0.1:1/v1/chat/completions",
        None,
    ))
    .unwrap();

    gateway.chat("conv", "first").await.unwrap();
    gateway.chat("conv", "second").await.unwrap();

    let frames = ws.state.frames();
    assert_eq!(frames.len(), 2);
    let history = frames[1]["payload"]["message"]["text"].as_array().unwrap();
    let roles: Vec<&str> = history.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(history[2]["content"], "second");
}
