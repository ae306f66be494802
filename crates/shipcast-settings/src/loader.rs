//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If `~/.shipcast/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SHIPCAST_*` environment overrides (highest priority)
//!
//! Objects merge recursively, arrays and primitives are replaced, and nulls
//! in the file are skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use shipcast_core::logging::LogFormat;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// The shipcast home directory (`~/.shipcast`).
pub fn shipcast_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".shipcast")
}

/// Path to the settings file (`~/.shipcast/settings.json`).
pub fn settings_path() -> PathBuf {
    shipcast_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an inconsistent result is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SHIPCAST_*` environment overrides.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (the process environment in
/// production, a map in tests).
pub fn apply_overrides<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // server
    if let Some(v) = env.string("SHIPCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("SHIPCAST_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("SHIPCAST_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.usize("SHIPCAST_QUEUE_CAPACITY", 1, 65_536) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = env.u64("SHIPCAST_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("SHIPCAST_HEARTBEAT_TIMEOUT_SECS", 2, 7200) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.usize("SHIPCAST_MAX_MESSAGE_SIZE", 1024, 16 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }

    // cache
    if let Some(v) = env.usize("SHIPCAST_CACHE_SIZE", 1, 10_000) {
        settings.cache.max_updates_per_shipment = v;
    }
    if let Some(v) = env.u64("SHIPCAST_CACHE_FRESHNESS_SECS", 0, 86_400) {
        settings.cache.freshness_window_secs = v;
    }
    if let Some(v) = env.u64("SHIPCAST_CACHE_INACTIVITY_SECS", 1, 604_800) {
        settings.cache.inactivity_threshold_secs = v;
    }
    if let Some(v) = env.u64("SHIPCAST_JANITOR_INTERVAL_SECS", 1, 86_400) {
        settings.cache.janitor_interval_secs = v;
    }

    // auth
    if let Some(v) = env.string("SHIPCAST_JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = env.string("SHIPCAST_JWT_ISSUER") {
        settings.auth.issuer = Some(v);
    }
    if let Some(v) = env.bool("SHIPCAST_ALLOW_ANONYMOUS") {
        settings.auth.allow_anonymous = v;
    }

    // store + logging
    if let Some(v) = env.string("SHIPCAST_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = env.string("SHIPCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = env.string("SHIPCAST_LOG_FORMAT") {
        match LogFormat::parse(&raw) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "SHIPCAST_LOG_FORMAT", value = %raw, "unknown log format, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
