//! Transcript entries.
//!
//! A [`Transcript`] is append-only: entries can be added at the end or the
//! whole transcript replaced (new conversation, loaded history), but an
//! appended [`Message`] is never edited in place.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Entity;
use crate::ids::MessageId;

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The local user.
    User,
    /// The chat backend.
    Bot,
}

impl Sender {
    /// Map a stored conversation role (`"user"`, `"assistant"`, ...) to a sender.
    ///
    /// Anything that is not `"user"` is treated as the bot.
    #[must_use]
    pub fn from_role(role: &str) -> Self {
        if role == "user" { Self::User } else { Self::Bot }
    }
}

/// One transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-side identifier.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Author.
    pub sender: Sender,
    /// ISO-8601 creation time.
    pub timestamp: String,
    /// Entity snapshot frozen at send time (user messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    /// Backend identifier of the reply (bot messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_message_id: Option<String>,
}

impl Message {
    /// A user message carrying its frozen entity snapshot.
    #[must_use]
    pub fn user(text: impl Into<String>, entities: Vec<Entity>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::User,
            timestamp: now_iso8601(),
            entities: Some(entities),
            server_message_id: None,
        }
    }

    /// A bot reply.
    #[must_use]
    pub fn bot(text: impl Into<String>, server_message_id: Option<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::Bot,
            timestamp: now_iso8601(),
            entities: None,
            server_message_id,
        }
    }

    /// A message restored from stored history, keeping its original timestamp.
    #[must_use]
    pub fn restored(text: impl Into<String>, sender: Sender, timestamp: Option<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender,
            timestamp: timestamp.unwrap_or_else(now_iso8601),
            entities: None,
            server_message_id: None,
        }
    }

    /// Entities to highlight when rendering this message.
    #[must_use]
    pub fn highlight_entities(&self) -> &[Entity] {
        match (self.sender, &self.entities) {
            (Sender::User, Some(entities)) => entities,
            _ => &[],
        }
    }
}

/// Current UTC time in RFC 3339 / ISO-8601 with millisecond precision.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Ordered, append-only sequence of messages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the whole transcript.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// All messages in append order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
