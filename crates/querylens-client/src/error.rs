//! Client error types.
//!
//! Transport and backend failures never reach the UI as errors on the hot
//! paths (typing, submitting): they become channel state, log lines, or the
//! fallback bot reply. These types surface only from explicit operations
//! such as loading a conversation or the proxied profile endpoints.

use querylens_settings::SettingsError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure of an HTTP call to the chat backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response (network error, timeout).
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL cannot be used.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The backend does not implement this operation.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

impl BackendError {
    /// HTTP status code, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure to establish the analysis socket.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The socket URL could not be built.
    #[error("invalid socket URL: {0}")]
    InvalidUrl(String),

    /// The WebSocket handshake failed.
    #[error("socket connect failed: {0}")]
    Connect(#[source] Box<tungstenite::Error>),
}

/// Top-level error for callers composing the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Analysis socket failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Configuration failure.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
