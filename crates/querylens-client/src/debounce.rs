//! Input debouncing.
//!
//! One pending timer, never a queue: each keystroke aborts the previous
//! timer and arms a new one. Only the text of the last keystroke in a burst
//! is ever analyzed, so at most one request goes out per quiet period.
//!
//! Whitespace-only input short-circuits: the pending timer is cancelled and
//! the live analysis is cleared synchronously, with no network traffic.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Where debounced input goes.
pub trait AnalysisSink: Send + Sync + 'static {
    /// Request analysis of `text` (best effort).
    fn analyze(&self, text: String);

    /// Drop the current live analysis.
    fn clear(&self);
}

/// Coalesces keystrokes into rate-limited analysis requests.
pub struct InputDebouncer {
    quiet: Duration,
    sink: Arc<dyn AnalysisSink>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl InputDebouncer {
    /// A debouncer that forwards to `sink` after `quiet` of inactivity.
    pub fn new(quiet: Duration, sink: Arc<dyn AnalysisSink>) -> Self {
        Self {
            quiet,
            sink,
            pending: Mutex::new(None),
        }
    }

    /// The configured quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Handle one keystroke carrying the full current input.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_input(&self, text: &str) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.take() {
            timer.abort();
        }
        if text.trim().is_empty() {
            drop(pending);
            self.sink.clear();
            return;
        }

        let sink = Arc::clone(&self.sink);
        let text = text.to_owned();
        let quiet = self.quiet;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            sink.analyze(text);
        }));
    }

    /// Cancel the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(timer) => {
                let was_pending = !timer.is_finished();
                timer.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for InputDebouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.get_mut().take() {
            timer.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
