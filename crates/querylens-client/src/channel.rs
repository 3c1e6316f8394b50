//! Streaming analysis channel over `tokio-tungstenite`.
//!
//! Owns at most one socket at a time, scoped to a `(user_id, session_id)`
//! identity. Outbound analyze frames are best effort: a frame offered while
//! the socket is not open is dropped, never queued for later.
//!
//! Every connection runs in its own task tagged with an epoch. `open` and
//! `close` bump the epoch, so a superseded task can finish its current step
//! but never writes channel state or forwards frames afterwards.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use querylens_core::constants::ANALYZER_WS_PATH;
use querylens_core::ids::{SessionId, UserId};
use querylens_core::protocol::{AnalysisResult, ClientFrame, ServerFrame};
use querylens_core::retry::BackoffConfig;
use querylens_settings::QueryLensSettings;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable connection status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// No socket.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; frames can be sent.
    Open,
}

impl ChannelState {
    /// Lowercase name for display and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        }
    }
}

/// The identity a connection is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Per-process user.
    pub user_id: UserId,
    /// Session to resume, if known.
    pub session_id: Option<SessionId>,
    /// Owner's session generation this connection belongs to. Handed back
    /// with every session assignment so the owner can reject stale ones.
    pub generation: u64,
}

impl ChannelIdentity {
    /// Identity for `user_id` with an optional session.
    pub fn new(user_id: UserId, session_id: Option<SessionId>) -> Self {
        Self {
            user_id,
            session_id,
            generation: 0,
        }
    }

    /// The same identity scoped to `generation`.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Whether a connection under `self` already serves `requested`.
    ///
    /// A request without a session is served by any connection for the
    /// same user and generation, including one whose session was assigned
    /// by the server.
    pub fn serves(&self, requested: &ChannelIdentity) -> bool {
        self.user_id == requested.user_id
            && self.generation == requested.generation
            && requested
                .session_id
                .as_ref()
                .is_none_or(|wanted| self.session_id.as_ref() == Some(wanted))
    }
}

/// Connection parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    /// Socket base URL (`ws://` or `wss://`).
    pub ws_url: String,
    /// Language passed to the analyzer.
    pub language: String,
    /// Capacity of the outbound frame queue.
    pub outbound_queue: usize,
    /// Reconnect policy; `None` leaves reconnecting to the owner.
    pub reconnect: Option<BackoffConfig>,
}

impl ChannelConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &QueryLensSettings) -> Self {
        Self {
            ws_url: settings.backend.ws_url.clone(),
            language: settings.backend.language.clone(),
            outbound_queue: settings.channel.outbound_queue.max(1),
            reconnect: settings.channel.reconnect.backoff(),
        }
    }
}

/// Receiver of decoded inbound frames.
pub trait FrameSink: Send + Sync + 'static {
    /// The server assigned a session during the handshake of a connection
    /// opened under `generation`.
    ///
    /// Returns the session the owner holds for that generation after the
    /// offer, which the channel then resumes on reconnect. `None` leaves
    /// the channel identity untouched.
    fn session_assigned(&self, generation: u64, session_id: SessionId) -> Option<SessionId>;

    /// A fresh analysis of the latest input arrived.
    fn analysis(&self, result: AnalysisResult);
}

/// Build the analyzer socket URL for `identity`.
pub fn build_url(
    ws_url: &str,
    language: &str,
    identity: &ChannelIdentity,
) -> Result<Url, ChannelError> {
    let mut url = Url::parse(ws_url).map_err(|e| ChannelError::InvalidUrl(format!("{ws_url}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "{ws_url}: expected ws:// or wss://"
        )));
    }
    let path = format!("{}{ANALYZER_WS_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    {
        let mut query = url.query_pairs_mut();
        let _ = query.append_pair("user_id", identity.user_id.as_str());
        let _ = query.append_pair("language", language);
        if let Some(session_id) = &identity.session_id {
            let _ = query.append_pair("session_id", session_id.as_str());
        }
    }
    Ok(url)
}

struct Connection {
    outbound: mpsc::Sender<ClientFrame>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    epoch: u64,
    identity: Option<ChannelIdentity>,
    active: Option<Connection>,
}

struct Shared {
    config: ChannelConfig,
    sink: Arc<dyn FrameSink>,
    state_tx: watch::Sender<ChannelState>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    /// Publish `state` if `epoch` is still current.
    fn set_state(&self, epoch: u64, state: ChannelState) -> bool {
        let inner = self.inner.lock();
        if inner.epoch != epoch {
            return false;
        }
        let _ = self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        true
    }

    /// URL for the identity of `epoch`, `None` once superseded.
    fn url_for(&self, epoch: u64) -> Option<Url> {
        let identity = {
            let inner = self.inner.lock();
            if inner.epoch != epoch {
                return None;
            }
            inner.identity.clone()?
        };
        match build_url(&self.config.ws_url, &self.config.language, &identity) {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(epoch, %error, "cannot build socket URL");
                None
            }
        }
    }

    /// Owner generation of the identity of `epoch`, `None` once superseded.
    fn generation_of(&self, epoch: u64) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.epoch != epoch {
            return None;
        }
        inner.identity.as_ref().map(|identity| identity.generation)
    }

    /// Record the session the owner accepted on the identity of `epoch`.
    fn learn_session(&self, epoch: u64, session_id: SessionId) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        if let Some(identity) = inner.identity.as_mut() {
            if identity.session_id.is_none() {
                identity.session_id = Some(session_id);
            }
        }
    }

    /// Release the connection slot of `epoch`.
    fn finish(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.active = None;
        let _ = self.state_tx.send_if_modified(|current| {
            let changed = *current != ChannelState::Disconnected;
            *current = ChannelState::Disconnected;
            changed
        });
    }

    fn dispatch(&self, epoch: u64, raw: &str) {
        if !self.is_current(epoch) {
            return;
        }
        match ServerFrame::decode(raw) {
            Ok(ServerFrame::Connection {
                session_id: Some(session_id),
            }) => {
                debug!(epoch, %session_id, "handshake assigned session");
                let Some(generation) = self.generation_of(epoch) else {
                    return;
                };
                if let Some(accepted) = self.sink.session_assigned(generation, session_id) {
                    self.learn_session(epoch, accepted);
                }
            }
            Ok(ServerFrame::Connection { session_id: None }) => {
                debug!(epoch, "handshake without session");
            }
            Ok(ServerFrame::Analysis(result)) => {
                debug!(epoch, entities = result.entities.len(), "analysis received");
                self.sink.analysis(result);
            }
            Ok(ServerFrame::Error { message }) => {
                warn!(epoch, reason = %message, "analyzer reported an error");
            }
            Ok(ServerFrame::Unknown { kind }) => {
                debug!(epoch, %kind, "ignoring unknown frame type");
            }
            Err(error) => {
                warn!(epoch, %error, "dropping undecodable frame");
            }
        }
    }
}

/// The streaming analysis channel.
pub struct StreamingChannel {
    shared: Arc<Shared>,
}

impl StreamingChannel {
    /// A closed channel delivering inbound frames to `sink`.
    pub fn new(config: ChannelConfig, sink: Arc<dyn FrameSink>) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                sink,
                state_tx,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Connection parameters.
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Open a connection for `identity`.
    ///
    /// A no-op when a connecting or open connection already serves
    /// `identity`. Any other connection, including one waiting to
    /// reconnect, is torn down first. Must be called from within a tokio
    /// runtime.
    pub fn open(&self, identity: ChannelIdentity) -> Result<(), ChannelError> {
        let _ = build_url(&self.shared.config.ws_url, &self.shared.config.language, &identity)?;

        let mut inner = self.shared.inner.lock();
        let live = *self.shared.state_tx.borrow() != ChannelState::Disconnected;
        if live
            && inner.active.is_some()
            && inner
                .identity
                .as_ref()
                .is_some_and(|current| current.serves(&identity))
        {
            debug!(user_id = %identity.user_id, "channel already open for identity");
            return Ok(());
        }
        if let Some(previous) = inner.active.take() {
            previous.cancel.cancel();
        }

        inner.epoch += 1;
        let epoch = inner.epoch;
        info!(
            epoch,
            user_id = %identity.user_id,
            session_id = identity.session_id.as_ref().map_or("", SessionId::as_str),
            "opening analysis channel"
        );
        inner.identity = Some(identity);

        let (outbound, outbound_rx) = mpsc::channel(self.shared.config.outbound_queue.max(1));
        let cancel = CancellationToken::new();
        let _ = self.shared.state_tx.send_if_modified(|current| {
            let changed = *current != ChannelState::Connecting;
            *current = ChannelState::Connecting;
            changed
        });
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            epoch,
            outbound_rx,
            cancel.clone(),
        ));
        inner.active = Some(Connection {
            outbound,
            cancel,
            _task: task,
        });
        Ok(())
    }

    /// Tear down the active connection. Safe to call when already closed.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        inner.identity = None;
        let Some(connection) = inner.active.take() else {
            return;
        };
        inner.epoch += 1;
        connection.cancel.cancel();
        let _ = self.shared.state_tx.send_if_modified(|current| {
            let changed = *current != ChannelState::Disconnected;
            *current = ChannelState::Disconnected;
            changed
        });
        info!(epoch = inner.epoch, "analysis channel closed");
    }

    /// Offer a frame for sending. Returns whether it was accepted.
    ///
    /// Frames are dropped unless the channel is open.
    pub fn send(&self, frame: ClientFrame) -> bool {
        let inner = self.shared.inner.lock();
        if *self.shared.state_tx.borrow() != ChannelState::Open {
            debug!("channel not open, dropping frame");
            return false;
        }
        let Some(connection) = inner.active.as_ref() else {
            return false;
        };
        match connection.outbound.try_send(frame) {
            Ok(()) => true,
            Err(error) => {
                debug!(%error, "outbound queue unavailable, dropping frame");
                false
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        *self.shared.state_tx.borrow()
    }

    /// Whether frames can be sent right now.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    /// Identity of the live connection, including a learned session.
    pub fn identity(&self) -> Option<ChannelIdentity> {
        self.shared.inner.lock().identity.clone()
    }
}

impl Drop for StreamingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn connect(url: &Url) -> Result<WsStream, ChannelError> {
    let (ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ChannelError::Connect(Box::new(e)))?;
    Ok(ws)
}

#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    Cancelled,
    Lost,
}

async fn run_connection(
    shared: Arc<Shared>,
    epoch: u64,
    mut outbound: mpsc::Receiver<ClientFrame>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        let Some(url) = shared.url_for(epoch) else { break };
        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = connect(&url) => result,
        };

        match connected {
            Ok(ws) => {
                attempt = 0;
                // Frames queued for a previous socket are stale.
                while outbound.try_recv().is_ok() {}
                if !shared.set_state(epoch, ChannelState::Open) {
                    break;
                }
                info!(epoch, "analysis channel open");
                if pump(&shared, epoch, ws, &mut outbound, &cancel).await == PumpExit::Cancelled {
                    break;
                }
            }
            Err(error) => {
                warn!(epoch, %error, "analysis channel connect failed");
            }
        }

        let Some(backoff) = shared.config.reconnect.as_ref() else {
            break;
        };
        if attempt >= backoff.max_attempts {
            warn!(epoch, attempts = attempt, "giving up reconnecting");
            break;
        }
        if !shared.set_state(epoch, ChannelState::Disconnected) {
            break;
        }
        let delay_ms = backoff.delay_ms(attempt, rand::random::<f64>());
        attempt += 1;
        debug!(epoch, attempt, delay_ms, "reconnecting");
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
        if !shared.set_state(epoch, ChannelState::Connecting) {
            break;
        }
    }
    shared.finish(epoch);
}

async fn pump(
    shared: &Shared,
    epoch: u64,
    ws: WsStream,
    outbound: &mut mpsc::Receiver<ClientFrame>,
    cancel: &CancellationToken,
) -> PumpExit {
    let (mut ws_tx, mut ws_rx) = ws.split();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                return PumpExit::Cancelled;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { return PumpExit::Cancelled };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(epoch, %error, "cannot encode frame");
                        continue;
                    }
                };
                if let Err(error) = ws_tx.send(WsMessage::Text(text.into())).await {
                    warn!(epoch, %error, "analysis channel send failed");
                    return PumpExit::Lost;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => shared.dispatch(epoch, text.as_str()),
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(epoch, "analysis channel closed by server");
                    return PumpExit::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(epoch, %error, "analysis channel error");
                    return PumpExit::Lost;
                }
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
