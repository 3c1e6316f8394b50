//! # querylens-core
//!
//! Foundation types for the QueryLens real-time chat analysis client.
//!
//! This crate provides the shared vocabulary that the client and CLI crates
//! depend on:
//!
//! - **Branded IDs**: `UserId`, `SessionId`, `MessageId` as newtypes for type safety
//! - **Entities**: `Entity` spans with their `EntityType` and display style
//! - **Intent flow**: `IntentFlow` snapshots of the backend's classification
//! - **Messages**: append-only `Transcript` of user and bot `Message`s
//! - **Protocol**: typed decode of inbound socket frames (`ServerFrame`)
//! - **Highlighting**: partition of a text into plain and entity segments
//! - **Retry**: backoff math used by the channel's reconnect policy

#![deny(unsafe_code)]

pub mod constants;
pub mod entities;
pub mod errors;
pub mod flow;
pub mod highlight;
pub mod ids;
pub mod messages;
pub mod protocol;
pub mod retry;
