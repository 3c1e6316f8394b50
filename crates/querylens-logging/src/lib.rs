//! # querylens-logging
//!
//! Subscriber setup for the `tracing` macros used across the workspace.
//!
//! - [`init_subscriber`]: compact human-readable output on stderr
//! - [`init_json_subscriber`]: one JSON object per line on stderr
//! - [`test_utils::capture_logs`]: in-memory capture for assertions in tests
//!
//! Both initializers honour `RUST_LOG` when it is set and fall back to the
//! given level directive otherwise. Calling either twice is a no-op.

#![deny(unsafe_code)]

pub mod test_utils;

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Stderr keeps log lines out of the way of the interactive transcript on
/// stdout.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
