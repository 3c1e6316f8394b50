//! Shared fixtures: a scripted analyzer socket on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use querylens_client::channel::FrameSink;
use querylens_core::ids::SessionId;
use querylens_core::protocol::AnalysisResult;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Frames the server answers an inbound text with.
pub type Script = fn(&str) -> Vec<Value>;

/// Answer every `analyze` frame with an analysis of its text.
pub fn echo_analysis(raw: &str) -> Vec<Value> {
    let Ok(frame) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    let text = frame["text"].as_str().unwrap_or_default();
    vec![analysis_for(text)]
}

/// Never answer.
pub fn silent(_: &str) -> Vec<Value> {
    Vec::new()
}

/// Tickers found by naive uppercase-word scan, as structured entities.
pub fn analysis_for(text: &str) -> Value {
    let mut company = Vec::new();
    let mut crypto = Vec::new();
    let mut offset = 0;
    for word in text.split(' ') {
        let start = offset;
        let end = start + word.chars().count();
        offset = end + 1;
        let entity = |kind: &str| json!({"type": kind, "value": word, "start": start, "end": end});
        match word {
            "BTC" | "ETH" => crypto.push(entity("crypto")),
            w if w.len() >= 3 && w.chars().all(|c| c.is_ascii_uppercase()) => {
                company.push(entity("company"));
            }
            _ => {}
        }
    }
    json!({
        "type": "analysis",
        "structured_entities": {"company": company, "crypto": crypto},
        "flow": {"steps": [{"label": "Parse", "color": "blue"}], "suggested_actions": ["Compare"]},
        "intent_analysis": {"primary_intent": {"intent_id": "comparison", "confidence": 0.8}}
    })
}

/// A scripted analyzer endpoint.
pub struct MockAnalyzer {
    pub addr: SocketAddr,
    uris: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    kick: broadcast::Sender<()>,
    _task: JoinHandle<()>,
}

impl MockAnalyzer {
    /// Start a server that greets each connection with `greeting` and
    /// answers inbound texts with `script`.
    pub async fn start(greeting: Option<Value>, script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let uris = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (kick, _) = broadcast::channel(4);

        let task = {
            let uris = uris.clone();
            let received = received.clone();
            let kick = kick.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let _ = tokio::spawn(serve(
                        stream,
                        greeting.clone(),
                        script,
                        uris.clone(),
                        received.clone(),
                        kick.subscribe(),
                    ));
                }
            })
        };

        Self {
            addr,
            uris,
            received,
            kick,
            _task: task,
        }
    }

    /// Base URL to configure the channel with.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Request URIs of every accepted handshake, in order.
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().clone()
    }

    /// Inbound texts from every connection, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Close every open connection from the server side.
    pub fn disconnect_all(&self) {
        let _ = self.kick.send(());
    }
}

async fn serve(
    stream: TcpStream,
    greeting: Option<Value>,
    script: Script,
    uris: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    mut kick: broadcast::Receiver<()>,
) {
    let record = uris.clone();
    let Ok(ws) = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        record.lock().push(req.uri().to_string());
        Ok(resp)
    })
    .await
    else {
        return;
    };
    let (mut tx, mut rx) = ws.split();
    if let Some(greeting) = greeting {
        if tx.send(Message::Text(greeting.to_string().into())).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            _ = kick.recv() => {
                let _ = tx.send(Message::Close(None)).await;
                return;
            }
            msg = rx.next() => {
                let Some(Ok(msg)) = msg else { return };
                let Message::Text(text) = msg else { continue };
                received.lock().push(text.to_string());
                for reply in script(text.as_str()) {
                    if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Frame sink recording everything it is handed. Holds the first session
/// it is offered, or one set up front in `held`.
#[derive(Default)]
pub struct RecordingSink {
    pub sessions: Mutex<Vec<SessionId>>,
    pub analyses: Mutex<Vec<AnalysisResult>>,
    pub held: Mutex<Option<SessionId>>,
}

impl FrameSink for RecordingSink {
    fn session_assigned(&self, _: u64, session_id: SessionId) -> Option<SessionId> {
        self.sessions.lock().push(session_id.clone());
        Some(self.held.lock().get_or_insert(session_id).clone())
    }

    fn analysis(&self, result: AnalysisResult) {
        self.analyses.lock().push(result);
    }
}

/// Poll `check` until it holds or [`TIMEOUT`] elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
