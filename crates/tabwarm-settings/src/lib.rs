//! # tabwarm-settings
//!
//! Configuration management with layered sources for the tabwarm service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`TabwarmSettings::default()`]
//! 2. **User file** — `~/.tabwarm/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `TABWARM_*` overrides (highest priority)
//!
//! The cached global is reloadable: [`reload_settings_from_path`] swaps it so
//! all subsequent [`get_settings`] calls see fresh data. The manager itself
//! takes its settings by value at start; the global exists for binaries and
//! hosts that want one shared snapshot.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
    tabwarm_dir,
};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings cache.
static SETTINGS: RwLock<Option<Arc<TabwarmSettings>>> = parking_lot::const_rwlock(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.tabwarm/settings.json` with env
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> Arc<TabwarmSettings> {
    if let Some(ref s) = *SETTINGS.read() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // Another thread may have initialized while we waited for the write lock
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            let mut defaults = TabwarmSettings::default();
            defaults.validate();
            defaults
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
pub fn init_settings(settings: TabwarmSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from `path` and swap the global cache.
///
/// Falls back to defaults (with a warning) if the file cannot be loaded.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            TabwarmSettings::default()
        }
    });
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
