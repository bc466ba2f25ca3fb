//! Whether speculative rendering is allowed right now.

use std::collections::BTreeSet;
use std::sync::Arc;

use tabwarm_settings::PrerenderSettings;

use crate::collaborators::{PolicySource, PredictionExtras};
use crate::errors::DisallowReason;

/// Settings switches combined with live host signals.
pub struct SpeculationPolicy {
    enabled: bool,
    allowed_headers: BTreeSet<String>,
    source: Arc<dyn PolicySource>,
}

impl SpeculationPolicy {
    /// Build from settings and the host's signal source.
    pub fn new(settings: &PrerenderSettings, source: Arc<dyn PolicySource>) -> Self {
        Self {
            enabled: settings.enabled,
            allowed_headers: settings
                .allowed_headers
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .collect(),
            source,
        }
    }

    /// `Ok` when a prerender may start.
    pub fn check(&self) -> Result<(), DisallowReason> {
        if !self.enabled || self.source.feature_disabled() {
            return Err(DisallowReason::FeatureDisabled);
        }
        if self.source.network_metered() {
            return Err(DisallowReason::NetworkMetered);
        }
        if self.source.low_end_device() {
            return Err(DisallowReason::LowEndDevice);
        }
        Ok(())
    }

    /// Header names in `extras` a speculative load cannot carry, sorted.
    pub fn unsupported_headers(&self, extras: &PredictionExtras) -> Vec<String> {
        extras
            .normalized_headers()
            .into_keys()
            .filter(|name| !self.allowed_headers.contains(name))
            .collect()
    }
}
