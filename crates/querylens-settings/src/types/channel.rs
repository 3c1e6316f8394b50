//! Analysis socket settings.

use querylens_core::retry::{
    BackoffConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS,
};
use serde::{Deserialize, Serialize};

/// Streaming channel settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Capacity of the outbound frame queue.
    pub outbound_queue: usize,
    /// Reconnect policy after an unexpected close.
    pub reconnect: ReconnectSettings,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            outbound_queue: 32,
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Reconnect policy.
///
/// Disabled by default: the channel only reconnects when its owner calls
/// `open` again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Whether to reconnect automatically.
    pub enabled: bool,
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms.
    pub max_delay_ms: u64,
    /// Maximum consecutive attempts.
    pub max_attempts: u32,
    /// Jitter factor 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl ReconnectSettings {
    /// The backoff policy, or `None` when reconnecting is disabled.
    #[must_use]
    pub fn backoff(&self) -> Option<BackoffConfig> {
        self.enabled.then(|| BackoffConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_factor: self.jitter_factor.clamp(0.0, 1.0),
        })
    }
}
