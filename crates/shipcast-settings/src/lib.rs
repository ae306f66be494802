//! # shipcast-settings
//!
//! Layered configuration for the shipcast relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.shipcast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SHIPCAST_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
    shipcast_home,
};
pub use types::{
    AuthSettings, CacheSettings, LoggingSettings, RelaySettings, ServerSettings, StoreSettings,
};
