//! Result merging.
//!
//! Two result streams meet here. Streamed analysis replaces the live entity
//! and intent state wholesale (last applied wins). Submitting a message
//! freezes the live entities onto the outgoing user message and then clears
//! the live state, in one step, so the two streams never see each other's
//! half-applied updates.

use parking_lot::Mutex;
use querylens_core::entities::Entity;
use querylens_core::flow::IntentFlow;
use querylens_core::messages::{Message, Transcript};
use querylens_core::protocol::AnalysisResult;

/// Transient analysis of the text currently being typed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveAnalysis {
    /// Entities of the latest analysis.
    pub entities: Vec<Entity>,
    /// Intent snapshot of the latest analysis, `None` once cleared.
    pub intent_flow: Option<IntentFlow>,
}

impl LiveAnalysis {
    /// Whether there is nothing to show.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.intent_flow.is_none()
    }
}

impl From<AnalysisResult> for LiveAnalysis {
    fn from(result: AnalysisResult) -> Self {
        Self {
            entities: result.entities,
            intent_flow: Some(result.intent_flow),
        }
    }
}

#[derive(Debug, Default)]
struct MergerState {
    live: LiveAnalysis,
    transcript: Transcript,
}

/// Owner of the transcript and the live analysis.
#[derive(Debug, Default)]
pub struct ResultMerger {
    state: Mutex<MergerState>,
}

impl ResultMerger {
    /// An empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live analysis with `result`.
    pub fn apply_analysis(&self, result: AnalysisResult) {
        self.state.lock().live = result.into();
    }

    /// Clear the live analysis. Returns whether anything was cleared.
    pub fn clear_analysis(&self) -> bool {
        let mut state = self.state.lock();
        let had_any = !state.live.is_empty();
        state.live = LiveAnalysis::default();
        had_any
    }

    /// Snapshot of the live analysis.
    pub fn live(&self) -> LiveAnalysis {
        self.state.lock().live.clone()
    }

    /// Append a user message carrying the live entities, then clear the
    /// live analysis.
    ///
    /// Returns the appended message and whether live state was cleared.
    pub fn commit_user_message(&self, text: &str) -> (Message, bool) {
        let mut state = self.state.lock();
        let live = std::mem::take(&mut state.live);
        let had_live = !live.is_empty();
        let message = Message::user(text, live.entities);
        state.transcript.push(message.clone());
        (message, had_live)
    }

    /// Append an already-built message.
    pub fn append(&self, message: Message) {
        self.state.lock().transcript.push(message);
    }

    /// Replace the transcript and clear the live analysis.
    pub fn replace_transcript(&self, messages: Vec<Message>) {
        let mut state = self.state.lock();
        state.transcript.replace(messages);
        state.live = LiveAnalysis::default();
    }

    /// Drop the transcript and the live analysis.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.transcript.clear();
        state.live = LiveAnalysis::default();
    }

    /// Copy of all transcript messages in order.
    pub fn transcript(&self) -> Vec<Message> {
        self.state.lock().transcript.messages().to_vec()
    }

    /// Number of transcript messages.
    pub fn transcript_len(&self) -> usize {
        self.state.lock().transcript.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
