//! Intent flow snapshots.
//!
//! The backend reports its classification of the latest analyzed text in two
//! loosely-related objects: `flow` (processing steps, suggestions, timing) and
//! `intent_analysis` (primary intent and confidence). [`IntentFlow::from_wire`]
//! folds both into one snapshot that replaces the previous one wholesale.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A metadata value: a string, a list of strings, or any other JSON kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Single string.
    Text(String),
    /// List of strings.
    List(Vec<String>),
    /// Any other JSON value.
    Other(Value),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(", ")),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered metadata mapping.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Colour tag of a processing step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepColor {
    /// Yellow.
    Yellow,
    /// Golden.
    Golden,
    /// Blue.
    Blue,
    /// Green, also the fallback for unknown tags.
    #[default]
    #[serde(other)]
    Green,
}

/// One stage of the backend's processing trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Human-readable stage label.
    #[serde(default)]
    pub label: String,
    /// Display colour.
    #[serde(rename = "color", default)]
    pub color: StepColor,
    /// Stage details.
    #[serde(default)]
    pub metadata: Metadata,
}

/// The backend's top-ranked intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimaryIntent {
    /// Intent identifier.
    pub id: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Intent parameters.
    pub metadata: Metadata,
}

/// Snapshot of how the backend classified and processed the latest text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentFlow {
    /// Top-ranked intent, if any.
    pub primary_intent: Option<PrimaryIntent>,
    /// Processing timeline (order-significant).
    pub steps: Option<Vec<FlowStep>>,
    /// Candidate follow-up queries.
    pub suggested_actions: Vec<String>,
    /// Total analysis time reported by the backend.
    pub total_duration_ms: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `flow` object of an analysis frame.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlowPayload {
    /// Processing steps.
    pub steps: Option<Vec<FlowStep>>,
    /// Suggested follow-ups.
    pub suggested_actions: Option<Vec<String>>,
    /// Total analysis time.
    pub total_duration_ms: Option<u64>,
}

/// `intent_analysis.primary_intent` object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrimaryIntentPayload {
    /// Intent identifier.
    pub intent_id: Option<String>,
    /// Confidence, if reported per intent.
    pub confidence: Option<f64>,
    /// Intent parameters.
    pub metadata: Metadata,
}

/// `intent_analysis` object of an analysis frame.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IntentAnalysisPayload {
    /// Top-ranked intent.
    pub primary_intent: Option<PrimaryIntentPayload>,
    /// Overall confidence.
    pub confidence: Option<f64>,
}

impl IntentFlow {
    /// Fold the wire `flow` and `intent_analysis` objects into one snapshot.
    ///
    /// A primary intent without its own confidence takes the overall
    /// `intent_analysis.confidence`; confidence is clamped into `[0, 1]`.
    #[must_use]
    pub fn from_wire(flow: Option<FlowPayload>, intent: Option<IntentAnalysisPayload>) -> Self {
        let flow = flow.unwrap_or_default();
        let primary_intent = intent.and_then(|analysis| {
            let primary = analysis.primary_intent?;
            let id = primary.intent_id?;
            let confidence = primary
                .confidence
                .or(analysis.confidence)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            Some(PrimaryIntent {
                id,
                confidence,
                metadata: primary.metadata,
            })
        });

        Self {
            primary_intent,
            steps: flow.steps,
            suggested_actions: flow.suggested_actions.unwrap_or_default(),
            total_duration_ms: flow.total_duration_ms,
        }
    }

    /// Whether the snapshot carries anything worth displaying.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary_intent.is_none()
            && self.steps.as_ref().is_none_or(Vec::is_empty)
            && self.suggested_actions.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
