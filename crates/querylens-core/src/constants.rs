//! Package-level constants.

/// Current version of the client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "querylens";

/// Bot reply shown when a chat request fails for any reason.
pub const FALLBACK_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// Quiet period before a keystroke burst is analyzed, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Title given to sessions created from the client.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Path of the analysis socket, relative to the socket base URL.
pub const ANALYZER_WS_PATH: &str = "/ws/query-analyzer";
