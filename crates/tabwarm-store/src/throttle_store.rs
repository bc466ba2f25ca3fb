//! Typed access to persisted throttle rows.
//!
//! One JSON row per owner identity. Only ban state is persisted; rate-limit
//! spacing is process-local and lives in the runtime.
//!
//! A row that cannot be parsed, or that holds non-finite numbers, is treated
//! as "never requested": readers get [`StoredThrottleRecord::default()`] and
//! a warning, never an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabwarm_core::OwnerIdentity;
use tabwarm_core::constants::MAX_BAN_SCORE;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::kv::KeyValueStore;

/// Persisted ban state for one identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredThrottleRecord {
    /// Ban score in `[0, max]`.
    pub score: f64,
    /// Time of the last prediction attempt, if any.
    pub last_prerender_at_ms: Option<i64>,
    /// The identity is banned while `now < banned_until_ms`.
    pub banned_until_ms: i64,
}

impl Default for StoredThrottleRecord {
    fn default() -> Self {
        Self {
            score: MAX_BAN_SCORE,
            last_prerender_at_ms: None,
            banned_until_ms: 0,
        }
    }
}

impl StoredThrottleRecord {
    fn is_sane(&self) -> bool {
        self.score.is_finite()
    }

    /// Whether the row has been idle past `forget_after_ms` at `now_ms`.
    ///
    /// Rows that never recorded an attempt carry nothing worth keeping.
    pub fn is_stale(&self, now_ms: i64, forget_after_ms: i64) -> bool {
        match self.last_prerender_at_ms {
            Some(at) => now_ms.saturating_sub(at) > forget_after_ms,
            None => true,
        }
    }
}

/// Outcome of a stale-row purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Rows removed for inactivity.
    pub stale: usize,
    /// Rows removed because they could not be parsed.
    pub corrupt: usize,
    /// Rows left in place.
    pub kept: usize,
}

/// Typed throttle-row access over any [`KeyValueStore`].
#[derive(Clone)]
pub struct ThrottleStore {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ThrottleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleStore").finish_non_exhaustive()
    }
}

impl ThrottleStore {
    /// Wrap a backend.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read the row for `owner`. Missing or corrupt rows yield defaults.
    pub fn load(&self, owner: OwnerIdentity) -> Result<StoredThrottleRecord> {
        let Some(raw) = self.kv.get(&owner.store_key())? else {
            return Ok(StoredThrottleRecord::default());
        };
        Ok(decode(&owner.store_key(), &raw).unwrap_or_default())
    }

    /// Write the row for `owner`.
    pub fn save(&self, owner: OwnerIdentity, record: &StoredThrottleRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.kv.put(&owner.store_key(), &raw)
    }

    /// Delete the row for `owner`. Returns `true` if one existed.
    pub fn remove(&self, owner: OwnerIdentity) -> Result<bool> {
        self.kv.remove(&owner.store_key())
    }

    /// Every parsable row. Corrupt rows and non-identity keys are skipped.
    pub fn load_all(&self) -> Result<Vec<(OwnerIdentity, StoredThrottleRecord)>> {
        let rows = self
            .kv
            .entries()?
            .into_iter()
            .filter_map(|(key, raw)| {
                let owner = key.parse::<OwnerIdentity>().ok()?;
                Some((owner, decode(&key, &raw)?))
            })
            .collect();
        Ok(rows)
    }

    /// Remove rows idle past `forget_after_ms`, plus corrupt ones.
    ///
    /// Safe to run alongside writers: a row is only deleted if it still
    /// holds the value the purge judged, so a save that lands mid-purge
    /// survives.
    pub fn purge_stale(&self, now_ms: i64, forget_after_ms: i64) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        for (key, raw) in self.kv.entries()? {
            let parsed = key.parse::<OwnerIdentity>().ok().and_then(|_| decode(&key, &raw));
            match parsed {
                Some(record) if !record.is_stale(now_ms, forget_after_ms) => report.kept += 1,
                Some(_) => {
                    if self.kv.remove_if(&key, &raw)? {
                        report.stale += 1;
                    } else {
                        report.kept += 1;
                    }
                }
                None => {
                    if self.kv.remove_if(&key, &raw)? {
                        report.corrupt += 1;
                    } else {
                        report.kept += 1;
                    }
                }
            }
        }
        if report.stale + report.corrupt > 0 {
            info!(
                stale = report.stale,
                corrupt = report.corrupt,
                kept = report.kept,
                "purged throttle rows"
            );
        } else {
            debug!(kept = report.kept, "no throttle rows to purge");
        }
        Ok(report)
    }
}

fn decode(key: &str, raw: &str) -> Option<StoredThrottleRecord> {
    match serde_json::from_str::<StoredThrottleRecord>(raw) {
        Ok(record) if record.is_sane() => Some(record),
        Ok(_) => {
            warn!(key, "throttle row holds non-finite score, resetting");
            None
        }
        Err(e) => {
            warn!(key, error = %e, "corrupt throttle row, resetting");
            None
        }
    }
}
