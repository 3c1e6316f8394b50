//! HTTP chat backend against a mock server.

use std::time::Duration;

use assert_matches::assert_matches;
use querylens_client::backend::{ChatBackend, ChatRequest, HttpChatBackend};
use querylens_client::error::BackendError;
use querylens_core::ids::{SessionId, UserId};
use querylens_settings::ProcessingMode;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpChatBackend {
    HttpChatBackend::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn user() -> UserId {
    "user_1".into()
}

#[tokio::test]
async fn chat_posts_full_body_and_decodes_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "message": "AAPL vs BTC",
            "user_id": "user_1",
            "session_id": null,
            "processing_mode": "immediate",
            "stream": false,
            "force_new_session": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "AAPL is a company, BTC a cryptocurrency.",
            "session_id": "srv-1",
            "message_id": 42
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest::new("AAPL vs BTC", user(), None, ProcessingMode::Immediate);
    let reply = backend(&server).send_message(&request).await.unwrap();
    assert_eq!(reply.response, "AAPL is a company, BTC a cryptocurrency.");
    assert_eq!(reply.session_id.unwrap().as_str(), "srv-1");
    assert_eq!(reply.message_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let request = ChatRequest::new("hi", user(), None, ProcessingMode::Complete);
    let error = backend(&server).send_message(&request).await.unwrap_err();
    assert_eq!(error.status(), Some(503));
    assert_matches!(error, BackendError::Status { ref body, .. } if body == "overloaded");
}

#[tokio::test]
async fn undecodable_reply_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let request = ChatRequest::new("hi", user(), None, ProcessingMode::Immediate);
    assert_matches!(
        backend(&server).send_message(&request).await,
        Err(BackendError::Decode(_))
    );
}

#[tokio::test]
async fn timeout_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let backend = HttpChatBackend::new(&server.uri(), Duration::from_millis(50)).unwrap();
    let request = ChatRequest::new("hi", user(), None, ProcessingMode::Immediate);
    assert_matches!(
        backend.send_message(&request).await,
        Err(BackendError::Transport(_))
    );
}

#[tokio::test]
async fn create_session_sends_user_and_title() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/new"))
        .and(body_json(json!({"user_id": "user_1", "title": "New Chat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = backend(&server).create_session(&user(), "New Chat").await.unwrap();
    assert_eq!(id.as_str(), "fresh");
}

#[tokio::test]
async fn conversation_history_and_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s-1/conversation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"role": "user", "content": "q", "timestamp": "2025-01-01T00:00:00Z"},
                {"role": "assistant", "content": "a"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/user_1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversations": [{"id": "s-1", "title": "Markets", "created_at": "2025-01-01"}]
        })))
        .mount(&server)
        .await;

    let b = backend(&server);
    let history = b.conversation(&SessionId::from("s-1")).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].timestamp.as_deref(), Some("2025-01-01T00:00:00Z"));

    let list = b.conversations(&user()).await.unwrap();
    assert_eq!(list[0].id.as_str(), "s-1");
    assert_eq!(list[0].title, "Markets");
}

#[tokio::test]
async fn missing_list_fields_default_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/user_1/facts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/mcp/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let b = backend(&server);
    assert!(b.user_facts(&user()).await.unwrap().is_empty());
    assert!(b.mcp_tools().await.unwrap().is_empty());
}

#[tokio::test]
async fn facts_settings_and_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/user_1/facts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "facts": [{"key": "risk", "value": "low"}, {"key": "age", "value": 41}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/users/user_1/settings"))
        .and(body_json(json!({"theme": "dark"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": ["a", "b"]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/model"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"model": "a"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/model"))
        .and(body_json(json!({"model": "b"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let b = backend(&server);
    let facts = b.user_facts(&user()).await.unwrap();
    let texts: Vec<_> = facts.iter().map(|f| f.value_text()).collect();
    assert_eq!(texts, ["low", "41"]);

    b.update_user_settings(&user(), &json!({"theme": "dark"})).await.unwrap();
    assert_eq!(b.models().await.unwrap(), ["a", "b"]);
    assert_eq!(b.current_model().await.unwrap(), "a");
    b.switch_model("b").await.unwrap();
}

#[tokio::test]
async fn mcp_and_health_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/mcp/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [{"name": "prices", "status": "connected"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/mcp/tools/get%20quote/execute"))
        .and(body_json(json!({"symbol": "AAPL"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": 1.0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/user_1/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .mount(&server)
        .await;

    let b = backend(&server);
    let servers = b.mcp_servers().await.unwrap();
    assert_eq!(servers[0].name, "prices");
    let result = b
        .execute_mcp_tool("get quote", &json!({"symbol": "AAPL"}))
        .await
        .unwrap();
    assert_eq!(result["price"], 1.0);
    assert_eq!(b.health().await.unwrap()["status"], "ok");
    let latest: Value = b.latest_analysis(&user()).await.unwrap();
    assert!(latest["entities"].as_array().unwrap().is_empty());
}
