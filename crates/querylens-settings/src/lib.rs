//! # querylens-settings
//!
//! Layered configuration for the QueryLens client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`QueryLensSettings::default()`]
//! 2. **User file**: `~/.querylens/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `QUERYLENS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<QueryLensSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.querylens/settings.json` with env
/// var overrides. If loading fails, the error is logged and compiled
/// defaults are used.
pub fn get_settings() -> &'static QueryLensSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to load settings, using defaults");
            QueryLensSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: QueryLensSettings) -> std::result::Result<(), QueryLensSettings> {
    SETTINGS.set(settings)
}
