//! Chat controller: composition root for the session manager, streaming
//! channel, input debouncer, result merger and chat backend.
//!
//! Front ends drive the controller with the UI contract (`open`, `close`,
//! `on_input`, `submit`, `start_new_session`, `load_conversation`) and
//! observe it through a broadcast of [`ClientEvent`]s plus the channel
//! state watch. Transport and backend failures on the hot paths never come
//! back as errors: they become channel state, log lines, or the fallback
//! bot reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use querylens_core::constants::FALLBACK_REPLY;
use querylens_core::ids::{SessionId, UserId};
use querylens_core::messages::Message;
use querylens_core::protocol::{AnalysisResult, ClientFrame};
use querylens_settings::{ProcessingMode, QueryLensSettings};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{
    ChatBackend, ChatReply, ChatRequest, ConversationSummary, HttpChatBackend, McpServer,
    McpTool, StoredMessage, UserFact,
};
use crate::channel::{ChannelConfig, ChannelIdentity, ChannelState, FrameSink, StreamingChannel};
use crate::debounce::{AnalysisSink, InputDebouncer};
use crate::error::{BackendError, ChannelError, ClientError};
use crate::merger::{LiveAnalysis, ResultMerger};
use crate::session::{SessionManager, SessionSource};

/// Capacity of the event broadcast.
const EVENT_CAPACITY: usize = 256;

/// Observable client events.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// A session id was adopted or explicitly switched to.
    SessionAssigned(SessionId),
    /// The live analysis was replaced.
    AnalysisUpdated(AnalysisResult),
    /// The live analysis was cleared.
    AnalysisCleared,
    /// A message was appended to the transcript.
    MessageAppended(Message),
    /// The transcript (and live analysis) was replaced wholesale.
    TranscriptReset(Vec<Message>),
    /// Whether any chat request is in flight.
    LoadingChanged(bool),
    /// A backend call failed; the UI already received a fallback.
    BackendError {
        /// Failed operation.
        operation: &'static str,
        /// Error description.
        message: String,
    },
}

struct Shared {
    session: SessionManager,
    merger: ResultMerger,
    events: broadcast::Sender<ClientEvent>,
    in_flight: AtomicUsize,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn begin_request(&self) {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) == 0 {
            self.emit(ClientEvent::LoadingChanged(true));
        }
    }

    fn end_request(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.emit(ClientEvent::LoadingChanged(false));
        }
    }

    /// Turn a chat outcome into the bot message and apply it if the
    /// session generation it was sent under is still current.
    fn settle_reply(&self, generation: u64, outcome: Result<ChatReply, BackendError>) -> Message {
        let (message, reply_session) = match outcome {
            Ok(reply) if !reply.response.trim().is_empty() => {
                (Message::bot(reply.response, reply.message_id), reply.session_id)
            }
            Ok(reply) => {
                warn!(session_id = ?reply.session_id, "chat reply had no text");
                (Message::bot(FALLBACK_REPLY, reply.message_id), reply.session_id)
            }
            Err(error) => {
                warn!(%error, "chat request failed");
                self.emit(ClientEvent::BackendError {
                    operation: "send_message",
                    message: error.to_string(),
                });
                (Message::bot(FALLBACK_REPLY, None), None)
            }
        };

        let applied = self.session.if_current(generation, |slot| {
            let adopted = reply_session
                .filter(|id| slot.adopt(id.clone(), SessionSource::ChatReply));
            self.merger.append(message.clone());
            adopted
        });
        match applied {
            Some(adopted) => {
                if let Some(id) = adopted {
                    self.emit(ClientEvent::SessionAssigned(id));
                }
                self.emit(ClientEvent::MessageAppended(message.clone()));
            }
            None => debug!(generation, "discarding reply for a previous session"),
        }
        message
    }
}

/// Inbound socket frames into session and merger state.
struct Dispatcher(Arc<Shared>);

impl FrameSink for Dispatcher {
    fn session_assigned(&self, generation: u64, session_id: SessionId) -> Option<SessionId> {
        let outcome = self.0.session.if_current(generation, |slot| {
            let adopted = slot.adopt(session_id.clone(), SessionSource::Handshake);
            (adopted, slot.session_id().cloned())
        });
        let Some((adopted, current)) = outcome else {
            debug!(generation, %session_id, "ignoring handshake from a previous session");
            return None;
        };
        if adopted {
            self.0.emit(ClientEvent::SessionAssigned(session_id));
        }
        current
    }

    fn analysis(&self, result: AnalysisResult) {
        self.0.merger.apply_analysis(result.clone());
        self.0.emit(ClientEvent::AnalysisUpdated(result));
    }
}

/// Debounced input onto the socket, or a synchronous clear.
struct InputRouter {
    shared: Arc<Shared>,
    channel: Arc<StreamingChannel>,
}

impl AnalysisSink for InputRouter {
    fn analyze(&self, text: String) {
        if !self.channel.send(ClientFrame::analyze(text)) {
            debug!(state = self.channel.state().as_str(), "analysis request dropped");
        }
    }

    fn clear(&self) {
        if self.shared.merger.clear_analysis() {
            self.shared.emit(ClientEvent::AnalysisCleared);
        }
    }
}

/// The client-side analysis session manager.
pub struct ChatController {
    shared: Arc<Shared>,
    channel: Arc<StreamingChannel>,
    debouncer: InputDebouncer,
    backend: Arc<dyn ChatBackend>,
    processing_mode: Mutex<ProcessingMode>,
    new_session_title: String,
}

impl ChatController {
    /// Compose a controller over `backend`.
    ///
    /// The user id comes from `session.userId` when configured, otherwise a
    /// fresh one is generated for this process.
    pub fn new(settings: &QueryLensSettings, backend: Arc<dyn ChatBackend>) -> Self {
        let user_id = settings
            .session
            .user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map_or_else(UserId::generate, UserId::from);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            session: SessionManager::new(user_id),
            merger: ResultMerger::new(),
            events,
            in_flight: AtomicUsize::new(0),
        });

        let channel = Arc::new(StreamingChannel::new(
            ChannelConfig::from_settings(settings),
            Arc::new(Dispatcher(Arc::clone(&shared))),
        ));
        let debouncer = InputDebouncer::new(
            Duration::from_millis(settings.analysis.debounce_ms),
            Arc::new(InputRouter {
                shared: Arc::clone(&shared),
                channel: Arc::clone(&channel),
            }),
        );

        info!(user_id = %shared.session.user_id(), "chat controller ready");
        Self {
            shared,
            channel,
            debouncer,
            backend,
            processing_mode: Mutex::new(settings.backend.processing_mode),
            new_session_title: settings.session.new_session_title.clone(),
        }
    }

    /// Compose a controller over the HTTP backend described by `settings`.
    pub fn from_settings(settings: &QueryLensSettings) -> Result<Self, ClientError> {
        let backend = HttpChatBackend::from_settings(&settings.backend)?;
        Ok(Self::new(settings, Arc::new(backend)))
    }

    // ─── Identity ────────────────────────────────────────────────────────

    /// The per-process user id.
    pub fn user_id(&self) -> &UserId {
        self.shared.session.user_id()
    }

    /// The current session id, if learned.
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.session.session_id()
    }

    // ─── Channel lifecycle ───────────────────────────────────────────────

    /// Open the analysis channel for the current identity.
    ///
    /// A no-op while a connection already serves it. Only a malformed
    /// socket URL is an error; connection failures show up as state.
    pub fn open(&self) -> Result<(), ChannelError> {
        let (session_id, generation) = self.shared.session.snapshot();
        let identity =
            ChannelIdentity::new(self.user_id().clone(), session_id).with_generation(generation);
        self.channel.open(identity)
    }

    /// Cancel pending input and close the analysis channel.
    pub fn close(&self) {
        let _ = self.debouncer.cancel();
        self.channel.close();
    }

    /// Current channel state.
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Watch channel state transitions.
    pub fn watch_channel(&self) -> watch::Receiver<ChannelState> {
        self.channel.subscribe_state()
    }

    // ─── Input and submit ────────────────────────────────────────────────

    /// Feed one keystroke's worth of input.
    pub fn on_input(&self, text: &str) {
        self.debouncer.on_input(text);
    }

    /// Submit `text` as a chat message.
    ///
    /// Returns `None` for blank input. Otherwise the user message is
    /// appended immediately, carrying the live entities, and the returned
    /// task resolves to the bot message (reply or fallback). The bot message
    /// is appended only if the session was not reset or switched meanwhile.
    pub fn submit(&self, text: &str) -> Option<JoinHandle<Message>> {
        if text.trim().is_empty() {
            return None;
        }
        let _ = self.debouncer.cancel();

        let (session_id, generation) = self.shared.session.snapshot();
        let (user_message, cleared) = self.shared.merger.commit_user_message(text);
        self.shared.emit(ClientEvent::MessageAppended(user_message));
        if cleared {
            self.shared.emit(ClientEvent::AnalysisCleared);
        }
        self.shared.begin_request();

        let request = ChatRequest::new(
            text,
            self.user_id().clone(),
            session_id,
            self.processing_mode(),
        );
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        Some(tokio::spawn(async move {
            let outcome = backend.send_message(&request).await;
            let message = shared.settle_reply(generation, outcome);
            shared.end_request();
            message
        }))
    }

    /// Processing mode attached to the next chat request.
    pub fn processing_mode(&self) -> ProcessingMode {
        *self.processing_mode.lock()
    }

    /// Switch the processing mode for subsequent chat requests.
    pub fn set_processing_mode(&self, mode: ProcessingMode) {
        let previous = std::mem::replace(&mut *self.processing_mode.lock(), mode);
        if previous != mode {
            info!(mode = mode.as_str(), "processing mode changed");
        }
    }

    /// Whether any chat request is in flight.
    pub fn is_loading(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) > 0
    }

    // ─── Sessions ────────────────────────────────────────────────────────

    /// Drop the current session and transcript and start a fresh session.
    ///
    /// The channel is reopened under the new identity either way. Returns
    /// the created session id, or `None` if the backend call failed (the
    /// session is then learned lazily).
    pub async fn start_new_session(&self) -> Option<SessionId> {
        self.close();
        let shared = &self.shared;
        let created = shared
            .session
            .start_new_session(self.backend.as_ref(), &self.new_session_title, || {
                shared.merger.clear();
                shared.emit(ClientEvent::TranscriptReset(Vec::new()));
            })
            .await;
        if let Some(id) = &created {
            shared.emit(ClientEvent::SessionAssigned(id.clone()));
        }
        if let Err(error) = self.open() {
            warn!(%error, "cannot reopen analysis channel");
        }
        created
    }

    /// Switch to a stored conversation.
    ///
    /// Replaces the transcript with the stored history and the session id
    /// with `session_id`, then reopens the channel. Returns the number of
    /// messages loaded.
    pub async fn load_conversation(&self, session_id: &SessionId) -> Result<usize, ClientError> {
        let history: Vec<Message> = self
            .backend
            .conversation(session_id)
            .await?
            .into_iter()
            .map(StoredMessage::into_message)
            .collect();
        let count = history.len();

        self.close();
        let shared = &self.shared;
        let _ = shared.session.replace(session_id.clone(), move || {
            shared.emit(ClientEvent::TranscriptReset(history.clone()));
            shared.merger.replace_transcript(history);
        });
        shared.emit(ClientEvent::SessionAssigned(session_id.clone()));
        info!(%session_id, messages = count, "conversation loaded");
        self.open()?;
        Ok(count)
    }

    // ─── Observation ─────────────────────────────────────────────────────

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Copy of the transcript.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.merger.transcript()
    }

    /// Snapshot of the live analysis.
    pub fn live_analysis(&self) -> LiveAnalysis {
        self.shared.merger.live()
    }

    /// Identity of the live channel connection.
    pub fn channel_identity(&self) -> Option<ChannelIdentity> {
        self.channel.identity()
    }

    // ─── Backend proxies ─────────────────────────────────────────────────

    /// This user's past conversations.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        self.backend.conversations(self.user_id()).await
    }

    /// Facts the backend has learned about this user.
    pub async fn user_facts(&self) -> Result<Vec<UserFact>, BackendError> {
        self.backend.user_facts(self.user_id()).await
    }

    /// Replace this user's backend-side settings.
    pub async fn update_user_settings(&self, settings: &Value) -> Result<(), BackendError> {
        self.backend.update_user_settings(self.user_id(), settings).await
    }

    /// Models the backend can switch between.
    pub async fn models(&self) -> Result<Vec<String>, BackendError> {
        self.backend.models().await
    }

    /// The backend's active model.
    pub async fn current_model(&self) -> Result<String, BackendError> {
        self.backend.current_model().await
    }

    /// Switch the backend's active model.
    pub async fn switch_model(&self, model: &str) -> Result<(), BackendError> {
        self.backend.switch_model(model).await
    }

    /// Tool servers registered with the backend.
    pub async fn mcp_servers(&self) -> Result<Vec<McpServer>, BackendError> {
        self.backend.mcp_servers().await
    }

    /// Register a tool server.
    pub async fn connect_mcp_server(&self, config: &Value) -> Result<Value, BackendError> {
        self.backend.connect_mcp_server(config).await
    }

    /// Tools exposed by registered servers.
    pub async fn mcp_tools(&self) -> Result<Vec<McpTool>, BackendError> {
        self.backend.mcp_tools().await
    }

    /// Run a tool by name.
    pub async fn execute_mcp_tool(&self, name: &str, params: &Value) -> Result<Value, BackendError> {
        self.backend.execute_mcp_tool(name, params).await
    }

    /// Backend health report.
    pub async fn health(&self) -> Result<Value, BackendError> {
        self.backend.health().await
    }

    /// Latest stored analysis for this user.
    pub async fn latest_analysis(&self) -> Result<Value, BackendError> {
        self.backend.latest_analysis(self.user_id()).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
