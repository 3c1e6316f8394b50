//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`QueryLensSettings::default()`]
//! 2. If `~/.querylens/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `QUERYLENS_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::QueryLensSettings;

/// Resolve the path to the settings file (`~/.querylens/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".querylens").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<QueryLensSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<QueryLensSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn load_file_layer(path: &Path) -> Result<QueryLensSettings> {
    let defaults = serde_json::to_value(QueryLensSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut QueryLensSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides_from(
    settings: &mut QueryLensSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = string("QUERYLENS_API_URL") {
        settings.backend.api_url = v;
    }
    if let Some(v) = string("QUERYLENS_WS_URL") {
        settings.backend.ws_url = v;
    }
    if let Some(v) = string("QUERYLENS_LANGUAGE") {
        settings.backend.language = v;
    }
    if let Some(v) = checked(&lookup, "QUERYLENS_REQUEST_TIMEOUT_MS", |s| {
        parse_u64_range(s, 1000, 600_000)
    }) {
        settings.backend.request_timeout_ms = v;
    }

    // ── Analysis / channel ──────────────────────────────────────────
    if let Some(v) = checked(&lookup, "QUERYLENS_DEBOUNCE_MS", |s| {
        parse_u64_range(s, 50, 10_000)
    }) {
        settings.analysis.debounce_ms = v;
    }
    if let Some(v) = checked(&lookup, "QUERYLENS_RECONNECT", parse_bool) {
        settings.channel.reconnect.enabled = v;
    }

    // ── Session / logging ───────────────────────────────────────────
    if let Some(v) = string("QUERYLENS_USER_ID") {
        settings.session.user_id = Some(v);
    }
    if let Some(v) = string("QUERYLENS_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn checked<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
