//! Settings loading: defaults → settings file → environment.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::TabwarmSettings;

/// `~/.tabwarm`, or `./.tabwarm` when `HOME` is unset.
pub fn tabwarm_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(".tabwarm")
}

/// Default settings file location.
pub fn settings_path() -> PathBuf {
    tabwarm_dir().join("settings.json")
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// everything else in `overlay` replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load from the default path with environment overrides.
pub fn load_settings() -> Result<TabwarmSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`, deep-merged over defaults, with environment overrides.
///
/// A missing file is not an error: defaults (plus env) are returned.
pub fn load_settings_from_path(path: &Path) -> Result<TabwarmSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate();
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<TabwarmSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            return Ok(TabwarmSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let user: Value = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let defaults = serde_json::to_value(TabwarmSettings::default())?;
    serde_json::from_value(deep_merge(defaults, user)).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `TABWARM_*` overrides read through `lookup`.
///
/// Unparsable values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut TabwarmSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(level) = lookup("TABWARM_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(path) = lookup("TABWARM_STORE_PATH") {
        settings.store.path = Some(PathBuf::from(path));
    }
    if let Some(raw) = lookup("TABWARM_PRERENDER_ENABLED") {
        match parse_bool(&raw) {
            Some(enabled) => settings.prerender.enabled = enabled,
            None => tracing::warn!(value = %raw, "ignoring invalid TABWARM_PRERENDER_ENABLED"),
        }
    }
    if let Some(raw) = lookup("TABWARM_MAX_SESSIONS") {
        match raw.trim().parse() {
            Ok(max) => settings.sessions.max_sessions = max,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid TABWARM_MAX_SESSIONS"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
