//! Backend endpoint settings.
//!
//! Where the chat API and the analysis socket live, and how chat requests
//! are issued.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// How the chat backend should process a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Answer as soon as possible.
    #[default]
    Immediate,
    /// Run the full pipeline before answering.
    Complete,
}

impl ProcessingMode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Complete => "complete",
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "complete" => Ok(Self::Complete),
            other => Err(SettingsError::InvalidValue(format!(
                "processing mode must be immediate or complete, got {other:?}"
            ))),
        }
    }
}

/// Chat API and analysis socket endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base URL of the HTTP chat API.
    pub api_url: String,
    /// Base URL of the analysis socket (`ws://` or `wss://`).
    pub ws_url: String,
    /// Language code sent on the socket handshake.
    pub language: String,
    /// Timeout for a single HTTP request in milliseconds.
    pub request_timeout_ms: u64,
    /// Processing mode attached to every chat request.
    pub processing_mode: ProcessingMode,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5002".to_string(),
            ws_url: "ws://localhost:5002".to_string(),
            language: "en".to_string(),
            request_timeout_ms: 30_000,
            processing_mode: ProcessingMode::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let s = BackendSettings::default();
        assert_eq!(s.api_url, "http://localhost:5002");
        assert_eq!(s.ws_url, "ws://localhost:5002");
        assert_eq!(s.language, "en");
        assert_eq!(s.request_timeout_ms, 30_000);
        assert_eq!(s.processing_mode, ProcessingMode::Immediate);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(BackendSettings::default()).unwrap();
        assert!(json.get("apiUrl").is_some());
        assert!(json.get("requestTimeoutMs").is_some());
        assert_eq!(json["processingMode"], "immediate");
    }

    #[test]
    fn processing_mode_wire_names() {
        let mode: ProcessingMode = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(mode, ProcessingMode::Complete);
        assert_eq!(mode.as_str(), "complete");
    }

    #[test]
    fn processing_mode_from_name() {
        assert_eq!("Immediate".parse::<ProcessingMode>().unwrap(), ProcessingMode::Immediate);
        assert_eq!(" complete ".parse::<ProcessingMode>().unwrap(), ProcessingMode::Complete);
        assert!(matches!(
            "eventually".parse::<ProcessingMode>(),
            Err(SettingsError::InvalidValue(_))
        ));
    }
}
