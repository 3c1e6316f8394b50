//! End-to-end flows through the controller: a scripted analyzer socket for
//! live analysis and a mock HTTP backend for chat.

mod common;

use querylens_client::channel::ChannelState;
use querylens_client::controller::{ChatController, ClientEvent};
use querylens_core::constants::FALLBACK_REPLY;
use querylens_core::messages::Sender;
use querylens_settings::{ProcessingMode, QueryLensSettings};
use serde_json::{Value, json};
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{MockAnalyzer, TIMEOUT, eventually, silent};

/// Answer the comparison query with fixed structured entities.
fn comparison_script(raw: &str) -> Vec<Value> {
    let frame: Value = serde_json::from_str(raw).unwrap_or_default();
    if frame["text"] != "AAPL vs BTC" {
        return Vec::new();
    }
    vec![json!({
        "type": "analysis",
        "entities": [{"type": "other", "value": "ignored", "start": 0, "end": 1}],
        "structured_entities": {
            "company": [{"value": "AAPL", "start": 0, "end": 4, "type": "company"}],
            "crypto": [{"value": "BTC", "start": 9, "end": 12, "type": "crypto"}]
        }
    })]
}

fn settings(api: &MockServer, analyzer: &MockAnalyzer) -> QueryLensSettings {
    let mut s = QueryLensSettings::default();
    s.backend.api_url = api.uri();
    s.backend.ws_url = analyzer.ws_url();
    s.session.user_id = Some("user_1".into());
    s
}

async fn open(controller: &ChatController) {
    let mut state = controller.watch_channel();
    controller.open().unwrap();
    let _ = timeout(TIMEOUT, state.wait_for(|s| *s == ChannelState::Open))
        .await
        .unwrap()
        .unwrap();
}

async fn mount_chat(api: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(api)
        .await;
}

#[tokio::test]
async fn typed_query_is_analyzed_once_then_frozen_on_submit() {
    let api = MockServer::start().await;
    mount_chat(
        &api,
        json!({"response": "Comparing AAPL and BTC.", "session_id": "srv-chat", "message_id": 7}),
    )
    .await;
    let greeting = json!({"type": "connection", "session_id": "srv-socket"});
    let analyzer = MockAnalyzer::start(Some(greeting), comparison_script).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    open(&controller).await;
    assert!(eventually(|| controller.session_id().is_some()).await);

    let typed = "AAPL vs BTC";
    for end in 1..=typed.len() {
        controller.on_input(&typed[..end]);
    }
    assert!(eventually(|| !controller.live_analysis().entities.is_empty()).await);

    // One frame for the whole burst, carrying the final text.
    let received = analyzer.received();
    assert_eq!(received.len(), 1);
    let sent: Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(sent, json!({"type": "analyze", "text": "AAPL vs BTC"}));

    let live = controller.live_analysis();
    let values: Vec<_> = live.entities.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, ["AAPL", "BTC"]);

    let handle = controller.submit(typed).unwrap();
    let transcript = controller.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].sender, Sender::User);
    assert_eq!(transcript[0].entities.as_ref(), Some(&live.entities));
    assert!(controller.live_analysis().entities.is_empty());

    let reply = handle.await.unwrap();
    assert_eq!(reply.text, "Comparing AAPL and BTC.");
    assert_eq!(reply.server_message_id.as_deref(), Some("7"));
    assert_eq!(controller.transcript().len(), 2);

    // The handshake answered first; the chat reply's session is rejected.
    assert_eq!(controller.session_id().unwrap().as_str(), "srv-socket");
    let requests = api.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["session_id"], "srv-socket");
    assert_eq!(body["message"], "AAPL vs BTC");
    controller.close();
}

#[tokio::test]
async fn chat_reply_assigns_session_when_handshake_has_none() {
    let api = MockServer::start().await;
    mount_chat(&api, json!({"response": "hello", "session_id": "srv-chat"})).await;
    let analyzer = MockAnalyzer::start(Some(json!({"type": "connection"})), silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    open(&controller).await;

    let _ = controller.submit("hello").unwrap().await.unwrap();
    assert_eq!(controller.session_id().unwrap().as_str(), "srv-chat");
    controller.close();
}

#[tokio::test]
async fn processing_mode_switch_reaches_the_posted_body() {
    let api = MockServer::start().await;
    mount_chat(&api, json!({"response": "ok"})).await;
    let analyzer = MockAnalyzer::start(None, silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();

    let _ = controller.submit("quick").unwrap().await.unwrap();
    controller.set_processing_mode(ProcessingMode::Complete);
    let _ = controller.submit("thorough").unwrap().await.unwrap();

    let modes: Vec<Value> = api
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap()["processing_mode"].clone())
        .collect();
    assert_eq!(modes, [json!("immediate"), json!("complete")]);
}

#[tokio::test]
async fn backend_failure_appends_fallback() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&api)
        .await;
    let analyzer = MockAnalyzer::start(None, silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    let mut events = controller.subscribe();

    let handle = controller.submit("hello").unwrap();
    assert_eq!(controller.transcript().len(), 1);
    let reply = handle.await.unwrap();
    assert_eq!(reply.text, FALLBACK_REPLY);

    let transcript = controller.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].sender, Sender::Bot);
    assert_eq!(transcript[1].text, FALLBACK_REPLY);

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        saw_error |= matches!(event, ClientEvent::BackendError { .. });
    }
    assert!(saw_error);
}

#[tokio::test]
async fn new_session_reconnects_under_created_id() {
    let api = MockServer::start().await;
    mount_chat(&api, json!({"response": "ok"})).await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "fresh"})))
        .mount(&api)
        .await;
    let greeting = json!({"type": "connection", "session_id": "first"});
    let analyzer = MockAnalyzer::start(Some(greeting), silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    open(&controller).await;
    let _ = controller.submit("hello").unwrap().await.unwrap();
    assert_eq!(controller.transcript().len(), 2);

    let created = controller.start_new_session().await;
    assert_eq!(created.unwrap().as_str(), "fresh");
    assert!(controller.transcript().is_empty());
    assert_eq!(controller.session_id().unwrap().as_str(), "fresh");

    assert!(eventually(|| analyzer.uris().len() == 2 && controller.channel_state() == ChannelState::Open).await);
    assert!(analyzer.uris()[1].ends_with("session_id=fresh"));
    controller.close();
}

#[tokio::test]
async fn failed_session_creation_leaves_session_unset() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/new"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&api)
        .await;
    let analyzer = MockAnalyzer::start(None, silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();

    assert!(controller.start_new_session().await.is_none());
    assert!(controller.session_id().is_none());
    assert!(eventually(|| controller.channel_state() == ChannelState::Open).await);
    assert!(!analyzer.uris()[0].contains("session_id"));
    controller.close();
}

#[tokio::test]
async fn loading_a_conversation_switches_session() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/past/conversation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"role": "user", "content": "What about ETH?"},
                {"role": "assistant", "content": "ETH is a cryptocurrency."}
            ]
        })))
        .mount(&api)
        .await;
    let greeting = json!({"type": "connection", "session_id": "current"});
    let analyzer = MockAnalyzer::start(Some(greeting), silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    open(&controller).await;
    assert!(eventually(|| controller.session_id().is_some()).await);

    let count = controller.load_conversation(&"past".into()).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(controller.session_id().unwrap().as_str(), "past");
    let texts: Vec<_> = controller.transcript().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, ["What about ETH?", "ETH is a cryptocurrency."]);

    assert!(eventually(|| analyzer.uris().len() == 2).await);
    assert!(analyzer.uris()[1].ends_with("session_id=past"));
    controller.close();
}

#[tokio::test]
async fn close_cancels_pending_analysis() {
    let api = MockServer::start().await;
    let analyzer = MockAnalyzer::start(None, silent).await;
    let controller = ChatController::from_settings(&settings(&api, &analyzer)).unwrap();
    open(&controller).await;

    controller.on_input("AAPL");
    controller.close();
    assert_eq!(controller.channel_state(), ChannelState::Disconnected);
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert!(analyzer.received().is_empty());
}
