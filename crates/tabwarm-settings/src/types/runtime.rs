//! Session, prerender, store, and logging settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Session registry limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Maximum number of concurrently open sessions.
    pub max_sessions: usize,
    /// Consecutive callback failures before a session is closed.
    pub max_callback_failures: u32,
    /// Interval of the dead-callback sweep on the home thread.
    pub sweep_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_callback_failures: 3,
            sweep_interval_ms: 30_000,
        }
    }
}

/// Speculative rendering switches.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrerenderSettings {
    /// Master switch for prerendering.
    pub enabled: bool,
    /// Whether a spare render resource may be kept warm.
    pub spare_enabled: bool,
    /// Recreate the spare right after a navigation consumed it.
    pub recreate_spare_after_navigation: bool,
    /// Request headers (lowercase) a prediction may carry and still prerender.
    pub allowed_headers: Vec<String>,
}

impl Default for PrerenderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            spare_enabled: true,
            recreate_spare_after_navigation: true,
            allowed_headers: vec!["accept-language".to_string()],
        }
    }
}

/// Persisted throttle store location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file. `None` resolves to `~/.tabwarm/throttle.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Private namespace for this throttling domain.
    pub namespace: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: None,
            namespace: "request_throttler".to_string(),
            pool_size: 4,
        }
    }
}

impl StoreSettings {
    /// Resolved database path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::loader::tabwarm_dir().join("throttle.db"))
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
