//! Chat backend contract and its HTTP implementation.
//!
//! [`ChatBackend`] is the seam between the session machinery and the
//! network. Only the three chat-path operations are required; the profile,
//! model and tool proxies default to [`BackendError::Unsupported`] so test
//! doubles and minimal backends stay small.

use std::time::Duration;

use async_trait::async_trait;
use querylens_core::ids::{SessionId, UserId};
use querylens_core::messages::{Message, Sender};
use querylens_settings::{BackendSettings, ProcessingMode};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::BackendError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// The user's message, as typed.
    pub message: String,
    /// Sender identity.
    pub user_id: UserId,
    /// Current session, `null` when none is known yet.
    pub session_id: Option<SessionId>,
    /// How the backend should process the message.
    pub processing_mode: ProcessingMode,
    /// Streaming replies are not consumed by this client.
    pub stream: bool,
    /// Ask the backend to open a fresh session for this message.
    pub force_new_session: bool,
}

impl ChatRequest {
    /// A non-streaming request in the current session.
    pub fn new(
        message: impl Into<String>,
        user_id: UserId,
        session_id: Option<SessionId>,
        processing_mode: ProcessingMode,
    ) -> Self {
        Self {
            message: message.into(),
            user_id,
            session_id,
            processing_mode,
            stream: false,
            force_new_session: false,
        }
    }
}

/// Reply to a chat request.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatReply {
    /// Reply text.
    pub response: String,
    /// Session the backend filed the exchange under.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Backend identifier of the reply.
    #[serde(default, deserialize_with = "lenient_id")]
    pub message_id: Option<String>,
}

/// Entry in a user's conversation list.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConversationSummary {
    /// Session id of the conversation.
    pub id: SessionId,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Creation time as reported by the backend.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A message from stored conversation history.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StoredMessage {
    /// `"user"`, `"assistant"`, ...
    pub role: String,
    /// Message body.
    #[serde(default)]
    pub content: String,
    /// Original timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StoredMessage {
    /// Convert into a transcript entry, keeping the original timestamp.
    pub fn into_message(self) -> Message {
        Message::restored(self.content, Sender::from_role(&self.role), self.timestamp)
    }
}

/// Something the backend has learned about the user.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UserFact {
    /// Fact name.
    pub key: String,
    /// Fact value, any JSON.
    #[serde(default)]
    pub value: Value,
}

impl UserFact {
    /// The value as display text (strings without quotes).
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A registered MCP server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct McpServer {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Remaining server fields, verbatim.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// A tool exposed through MCP.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct McpTool {
    /// Tool name, used in the execute path.
    pub name: String,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
    /// Remaining tool fields, verbatim.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Deserialize)]
struct CreatedSession {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
}

#[derive(Deserialize)]
struct ConversationHistory {
    #[serde(default)]
    messages: Vec<StoredMessage>,
}

#[derive(Deserialize)]
struct FactList {
    #[serde(default)]
    facts: Vec<UserFact>,
}

#[derive(Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<McpServer>,
}

#[derive(Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelList {
    Bare(Vec<String>),
    Wrapped {
        #[serde(default)]
        models: Vec<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CurrentModel {
    Bare(String),
    Wrapped { model: String },
}

/// Accept ids sent as either strings or numbers.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Request/response operations against the chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one chat message and wait for the reply.
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// Create a new session for `user_id`.
    async fn create_session(&self, user_id: &UserId, title: &str)
    -> Result<SessionId, BackendError>;

    /// Message history of a stored conversation.
    async fn conversation(&self, session_id: &SessionId)
    -> Result<Vec<StoredMessage>, BackendError>;

    /// The user's past conversations.
    async fn conversations(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        Err(BackendError::Unsupported("conversations"))
    }

    /// Facts the backend has learned about the user.
    async fn user_facts(&self, _user_id: &UserId) -> Result<Vec<UserFact>, BackendError> {
        Err(BackendError::Unsupported("user_facts"))
    }

    /// Replace the user's backend-side settings.
    async fn update_user_settings(
        &self,
        _user_id: &UserId,
        _settings: &Value,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("update_user_settings"))
    }

    /// Names of the selectable models.
    async fn models(&self) -> Result<Vec<String>, BackendError> {
        Err(BackendError::Unsupported("models"))
    }

    /// The model currently answering chat requests.
    async fn current_model(&self) -> Result<String, BackendError> {
        Err(BackendError::Unsupported("current_model"))
    }

    /// Switch the answering model.
    async fn switch_model(&self, _model: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("switch_model"))
    }

    /// Registered MCP servers.
    async fn mcp_servers(&self) -> Result<Vec<McpServer>, BackendError> {
        Err(BackendError::Unsupported("mcp_servers"))
    }

    /// Register an MCP server; returns the backend's answer verbatim.
    async fn connect_mcp_server(&self, _config: &Value) -> Result<Value, BackendError> {
        Err(BackendError::Unsupported("connect_mcp_server"))
    }

    /// Tools exposed by the registered MCP servers.
    async fn mcp_tools(&self) -> Result<Vec<McpTool>, BackendError> {
        Err(BackendError::Unsupported("mcp_tools"))
    }

    /// Run one MCP tool.
    async fn execute_mcp_tool(&self, _name: &str, _params: &Value) -> Result<Value, BackendError> {
        Err(BackendError::Unsupported("execute_mcp_tool"))
    }

    /// Backend health document.
    async fn health(&self) -> Result<Value, BackendError> {
        Err(BackendError::Unsupported("health"))
    }

    /// Most recent stored analysis for the user.
    async fn latest_analysis(&self, _user_id: &UserId) -> Result<Value, BackendError> {
        Err(BackendError::Unsupported("latest_analysis"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────────────────

/// [`ChatBackend`] over HTTP using `reqwest`.
pub struct HttpChatBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpChatBackend {
    /// Create a backend rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("querylens/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Ok(Self { client, base })
    }

    /// Create a backend from the `backend` settings section.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, BackendError> {
        Self::new(
            &settings.api_url,
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments to the base URL, percent-encoding each.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            let _ = path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let url = self.endpoint(segments);
        debug!(%url, "GET");
        Self::execute(self.client.get(url)).await
    }

    async fn send<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        debug!(%method, %url, "backend request");
        Self::execute(self.client.request(method, url).json(body)).await
    }

    async fn execute<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        // Endpoints that answer with an empty body decode as `null`.
        let text = if text.trim().is_empty() { "null" } else { &text };
        Ok(serde_json::from_str(text)?)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        self.send(Method::POST, &["api", "chat"], request).await
    }

    async fn create_session(
        &self,
        user_id: &UserId,
        title: &str,
    ) -> Result<SessionId, BackendError> {
        let body = serde_json::json!({ "user_id": user_id, "title": title });
        let created: CreatedSession = self
            .send(Method::POST, &["api", "sessions", "new"], &body)
            .await?;
        Ok(created.session_id)
    }

    async fn conversation(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<StoredMessage>, BackendError> {
        let history: ConversationHistory = self
            .get(&["api", "sessions", session_id.as_str(), "conversation"])
            .await?;
        Ok(history.messages)
    }

    async fn conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        let list: ConversationList = self
            .get(&["api", "users", user_id.as_str(), "conversations"])
            .await?;
        Ok(list.conversations)
    }

    async fn user_facts(&self, user_id: &UserId) -> Result<Vec<UserFact>, BackendError> {
        let list: FactList = self
            .get(&["api", "users", user_id.as_str(), "facts"])
            .await?;
        Ok(list.facts)
    }

    async fn update_user_settings(
        &self,
        user_id: &UserId,
        settings: &Value,
    ) -> Result<(), BackendError> {
        let _: Value = self
            .send(
                Method::PUT,
                &["api", "users", user_id.as_str(), "settings"],
                settings,
            )
            .await?;
        Ok(())
    }

    async fn models(&self) -> Result<Vec<String>, BackendError> {
        let list: ModelList = self.get(&["models"]).await?;
        Ok(match list {
            ModelList::Bare(models) | ModelList::Wrapped { models } => models,
        })
    }

    async fn current_model(&self) -> Result<String, BackendError> {
        let current: CurrentModel = self.get(&["model"]).await?;
        Ok(match current {
            CurrentModel::Bare(model) | CurrentModel::Wrapped { model } => model,
        })
    }

    async fn switch_model(&self, model: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "model": model });
        let _: Value = self.send(Method::POST, &["model"], &body).await?;
        Ok(())
    }

    async fn mcp_servers(&self) -> Result<Vec<McpServer>, BackendError> {
        let list: ServerList = self.get(&["api", "mcp", "servers"]).await?;
        Ok(list.servers)
    }

    async fn connect_mcp_server(&self, config: &Value) -> Result<Value, BackendError> {
        self.send(Method::POST, &["api", "mcp", "servers"], config)
            .await
    }

    async fn mcp_tools(&self) -> Result<Vec<McpTool>, BackendError> {
        let list: ToolList = self.get(&["api", "mcp", "tools"]).await?;
        Ok(list.tools)
    }

    async fn execute_mcp_tool(&self, name: &str, params: &Value) -> Result<Value, BackendError> {
        self.send(Method::POST, &["api", "mcp", "tools", name, "execute"], params)
            .await
    }

    async fn health(&self) -> Result<Value, BackendError> {
        self.get(&["health"]).await
    }

    async fn latest_analysis(&self, user_id: &UserId) -> Result<Value, BackendError> {
        self.get(&["api", "analysis", user_id.as_str(), "latest"])
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
