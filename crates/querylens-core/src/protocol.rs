//! Wire protocol of the analysis socket.
//!
//! Outbound: one [`ClientFrame::Analyze`] per debounced input.
//!
//! Inbound frames are JSON objects discriminated by a `type` string. They are
//! decoded once, here, into the closed [`ServerFrame`] set before any other
//! code looks at them. Unknown types decode to [`ServerFrame::Unknown`] so
//! newer servers do not break older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Entity, StructuredEntities, reconcile};
use crate::errors::ProtocolError;
use crate::flow::{FlowPayload, IntentAnalysisPayload, IntentFlow};
use crate::ids::SessionId;

/// Frames sent from the client to the analyzer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Analyze the given input text.
    Analyze {
        /// The full current input.
        text: String,
    },
}

impl ClientFrame {
    /// Build an analyze request.
    #[must_use]
    pub fn analyze(text: impl Into<String>) -> Self {
        Self::Analyze { text: text.into() }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Result of one analysis pass, ready to replace the live state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisResult {
    /// Reconciled entity list.
    pub entities: Vec<Entity>,
    /// Intent and processing snapshot.
    pub intent_flow: IntentFlow,
}

/// Frames pushed by the analyzer.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerFrame {
    /// Handshake acknowledgement, possibly assigning a session.
    Connection {
        /// Server-assigned session id.
        session_id: Option<SessionId>,
    },
    /// Analysis of the most recently received input.
    Analysis(AnalysisResult),
    /// Backend-reported error.
    Error {
        /// Error description.
        message: String,
    },
    /// A frame type this client does not understand.
    Unknown {
        /// The unrecognized `type` value.
        kind: String,
    },
}

#[derive(Deserialize)]
struct ConnectionPayload {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct AnalysisPayload {
    entities: Option<Vec<Entity>>,
    structured_entities: Option<StructuredEntities>,
    flow: Option<FlowPayload>,
    intent_analysis: Option<IntentAnalysisPayload>,
}

fn payload<T: for<'de> Deserialize<'de>>(
    value: Value,
    kind: &'static str,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

impl ServerFrame {
    /// Decode one inbound text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();

        match kind.as_str() {
            "connection" => {
                let p: ConnectionPayload = payload(value, "connection")?;
                Ok(Self::Connection {
                    session_id: p.session_id.filter(|s| !s.is_empty()).map(SessionId::from),
                })
            }
            "analysis" => {
                let p: AnalysisPayload = payload(value, "analysis")?;
                Ok(Self::Analysis(AnalysisResult {
                    entities: reconcile(p.structured_entities, p.entities),
                    intent_flow: IntentFlow::from_wire(p.flow, p.intent_analysis),
                }))
            }
            "error" => {
                let p: ErrorPayload = payload(value, "error")?;
                Ok(Self::Error {
                    message: p.message.unwrap_or_else(|| "unknown error".to_owned()),
                })
            }
            _ => Ok(Self::Unknown { kind }),
        }
    }

    /// The `type` discriminator this frame was decoded from.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Analysis(_) => "analysis",
            Self::Error { .. } => "error",
            Self::Unknown { kind } => kind,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
