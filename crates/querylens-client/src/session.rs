//! Session identity.
//!
//! The user id is fixed for the lifetime of the manager. The session id
//! starts unset and is learned lazily from whichever source answers first:
//! the socket handshake, a chat reply, or an explicit session creation.
//! Once set it is never overwritten by a later source (first writer wins);
//! only [`SessionManager::reset`] and [`SessionManager::replace`] change it.
//!
//! Every reset or replacement bumps a generation counter. Work started under
//! one generation (a chat request, a session creation) applies its result
//! only if the generation is unchanged when the result arrives.

use parking_lot::Mutex;
use querylens_core::ids::{SessionId, UserId};
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;

/// Where a session id was learned from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSource {
    /// `connection` frame on the analysis socket.
    Handshake,
    /// `session_id` field of a chat reply.
    ChatReply,
    /// Explicit `create session` call.
    Created,
}

impl SessionSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::ChatReply => "chat_reply",
            Self::Created => "created",
        }
    }
}

/// The mutable session slot, visible to callers of
/// [`SessionManager::if_current`] while the lock is held.
#[derive(Debug, Default)]
pub struct SessionSlot {
    session_id: Option<SessionId>,
    generation: u64,
}

impl SessionSlot {
    /// Current session id.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Adopt `id` unless a session id is already set.
    ///
    /// Returns `true` when the id was adopted.
    pub fn adopt(&mut self, id: SessionId, source: SessionSource) -> bool {
        match &self.session_id {
            None => {
                info!(session_id = %id, source = source.as_str(), "session assigned");
                self.session_id = Some(id);
                true
            }
            Some(current) if *current == id => false,
            Some(current) => {
                debug!(
                    current = %current,
                    rejected = %id,
                    source = source.as_str(),
                    "session already assigned, ignoring"
                );
                false
            }
        }
    }
}

/// Owner of the `(user_id, session_id)` identity.
#[derive(Debug)]
pub struct SessionManager {
    user_id: UserId,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    /// A manager for `user_id` with no session yet.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    /// The per-process user identity. Never changes.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The current session id, if one has been learned.
    pub fn session_id(&self) -> Option<SessionId> {
        self.slot.lock().session_id.clone()
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// The current session id and generation, read together.
    pub fn snapshot(&self) -> (Option<SessionId>, u64) {
        let slot = self.slot.lock();
        (slot.session_id.clone(), slot.generation)
    }

    /// Offer a session id; first writer wins.
    pub fn adopt(&self, id: SessionId, source: SessionSource) -> bool {
        self.slot.lock().adopt(id, source)
    }

    /// Run `f` with the slot locked, only if the generation still equals
    /// `generation`. No reset or replacement can interleave with `f`.
    pub fn if_current<R>(&self, generation: u64, f: impl FnOnce(&mut SessionSlot) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        (slot.generation == generation).then(|| f(&mut slot))
    }

    /// Forget the current session and start a new generation.
    ///
    /// `on_reset` runs while the slot is locked, so state owned by the old
    /// session can be cleared before any late result of the new generation
    /// is applied. Returns the new generation.
    pub fn reset(&self, on_reset: impl FnOnce()) -> u64 {
        let mut slot = self.slot.lock();
        slot.session_id = None;
        slot.generation += 1;
        on_reset();
        slot.generation
    }

    /// Explicitly switch to `id` (e.g. a loaded past conversation).
    ///
    /// Unlike [`adopt`](Self::adopt) this overwrites any current id and
    /// starts a new generation. `on_replace` runs under the lock.
    pub fn replace(&self, id: SessionId, on_replace: impl FnOnce()) -> u64 {
        let mut slot = self.slot.lock();
        info!(session_id = %id, "session replaced");
        slot.session_id = Some(id);
        slot.generation += 1;
        on_replace();
        slot.generation
    }

    /// Invalidate the current session and ask the backend for a new one.
    ///
    /// Never fails: a backend error is logged and `None` returned, leaving
    /// the session unset so it can be learned lazily later.
    pub async fn start_new_session(
        &self,
        backend: &dyn ChatBackend,
        title: &str,
        on_reset: impl FnOnce(),
    ) -> Option<SessionId> {
        let generation = self.reset(on_reset);
        match backend.create_session(&self.user_id, title).await {
            Ok(id) => {
                let adopted = self
                    .if_current(generation, |slot| slot.adopt(id.clone(), SessionSource::Created))
                    .unwrap_or(false);
                adopted.then_some(id)
            }
            Err(error) => {
                warn!(user_id = %self.user_id, %error, "failed to create session");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
