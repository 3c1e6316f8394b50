//! Protocol error types.
//!
//! Decode failures at the socket boundary. None of them is fatal: the
//! channel logs and drops the offending frame.

use thiserror::Error;

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is JSON but has no string `type` discriminator.
    #[error("frame has no type discriminator")]
    MissingType,

    /// The frame's type is known but its payload has the wrong shape.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The `type` discriminator of the frame.
        kind: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}
