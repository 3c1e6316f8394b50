//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every struct is `#[serde(default)]`,
//! so partial JSON works: missing fields get their default value.

mod backend;
mod channel;

pub use backend::*;
pub use channel::*;

use querylens_core::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_SESSION_TITLE};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the QueryLens client.
///
/// Loaded from `~/.querylens/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "backend": { "apiUrl": "https://chat.example.com" },
///   "analysis": { "debounceMs": 250 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryLensSettings {
    /// Chat API and analysis socket endpoints.
    pub backend: BackendSettings,
    /// Live analysis behaviour.
    pub analysis: AnalysisSettings,
    /// Analysis socket behaviour.
    pub channel: ChannelSettings,
    /// Session defaults.
    pub session: SessionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl QueryLensSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let api = &self.backend.api_url;
        if !(api.starts_with("http://") || api.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "backend.apiUrl must be an http(s) URL, got {api:?}"
            )));
        }
        let ws = &self.backend.ws_url;
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "backend.wsUrl must be a ws(s) URL, got {ws:?}"
            )));
        }
        if self.analysis.debounce_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "analysis.debounceMs must be positive".to_string(),
            ));
        }
        if self.channel.outbound_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "channel.outboundQueue must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Live analysis settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    /// Quiet period before the latest input is sent for analysis.
    pub debounce_ms: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Session defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Title given to sessions created with "new conversation".
    pub new_session_title: String,
    /// Fixed user id. When unset a `user_<millis>` id is generated per process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            new_session_title: DEFAULT_SESSION_TITLE.to_string(),
            user_id: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip_defaults() {
        let settings = QueryLensSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: QueryLensSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn camel_case_sections() {
        let json = serde_json::to_value(QueryLensSettings::default()).unwrap();
        assert_eq!(json["analysis"]["debounceMs"], 300);
        assert_eq!(json["session"]["newSessionTitle"], "New Chat");
        assert!(json["session"].get("userId").is_none());
        assert_eq!(json["logging"]["level"], "warn");
    }

    #[test]
    fn empty_json_produces_defaults() {
        let settings: QueryLensSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, QueryLensSettings::default());
    }

    #[test]
    fn partial_json_overrides() {
        let json = serde_json::json!({
            "backend": {"language": "de"},
            "session": {"userId": "user_42"}
        });
        let settings: QueryLensSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.backend.language, "de");
        assert_eq!(settings.backend.api_url, "http://localhost:5002");
        assert_eq!(settings.session.user_id.as_deref(), Some("user_42"));
        assert_eq!(settings.session.new_session_title, "New Chat");
    }

    #[test]
    fn defaults_validate() {
        assert!(QueryLensSettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let mut settings = QueryLensSettings::default();
        settings.backend.ws_url = "http://localhost:5002".to_string();
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));

        let mut settings = QueryLensSettings::default();
        settings.backend.api_url = "localhost".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut settings = QueryLensSettings::default();
        settings.analysis.debounce_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = QueryLensSettings::default();
        settings.channel.outbound_queue = 0;
        assert!(settings.validate().is_err());
    }
}
