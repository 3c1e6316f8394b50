//! # querylens-client
//!
//! Client-side streaming analysis session manager.
//!
//! - **Session**: `(user_id, session_id)` identity with first-writer-wins
//!   adoption and generation-tagged resets
//! - **Channel**: one analysis WebSocket at a time, best-effort sends,
//!   observable state, optional reconnect
//! - **Debounce**: single-timer coalescing of keystrokes
//! - **Merger**: live analysis vs. transcript, frozen entity snapshots
//! - **Backend**: the HTTP chat API behind the [`ChatBackend`] trait
//! - **Controller**: [`ChatController`] composing all of the above

#![deny(unsafe_code)]

pub mod backend;
pub mod channel;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod merger;
pub mod session;

pub use backend::{ChatBackend, HttpChatBackend};
pub use channel::{ChannelState, StreamingChannel};
pub use controller::{ChatController, ClientEvent};
pub use error::{BackendError, ChannelError, ClientError};
