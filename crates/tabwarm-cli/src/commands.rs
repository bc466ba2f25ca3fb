//! Subcommand implementations over an opened [`ThrottleStore`].

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tabwarm_core::OwnerIdentity;
use tabwarm_runtime::throttle::BanPolicy;
use tabwarm_store::{PurgeReport, StoredThrottleRecord, ThrottleStore};

/// One persisted row as shown to operators.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub owner: u32,
    pub score: f64,
    pub last_prerender_at: Option<String>,
    pub banned_until: Option<String>,
    pub allowed: bool,
}

impl RecordView {
    fn new(owner: OwnerIdentity, record: &StoredThrottleRecord, now_ms: i64) -> Self {
        Self {
            owner: owner.uid(),
            score: record.score,
            last_prerender_at: record.last_prerender_at_ms.map(format_ms),
            banned_until: (record.banned_until_ms > now_ms).then(|| format_ms(record.banned_until_ms)),
            allowed: BanPolicy::is_allowed(record, now_ms),
        }
    }
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |t| t.to_rfc3339())
}

pub fn records(store: &ThrottleStore, now_ms: i64) -> Result<Vec<RecordView>> {
    let rows = store.load_all().context("reading throttle rows")?;
    Ok(rows
        .iter()
        .map(|(owner, record)| RecordView::new(*owner, record, now_ms))
        .collect())
}

/// Missing rows report the defaults a fresh identity starts with.
pub fn status(store: &ThrottleStore, owner: OwnerIdentity, now_ms: i64) -> Result<RecordView> {
    let record = store
        .load(owner)
        .with_context(|| format!("reading throttle row for {owner}"))?;
    Ok(RecordView::new(owner, &record, now_ms))
}

pub fn purge(store: &ThrottleStore, now_ms: i64, forget_after_ms: i64) -> Result<PurgeReport> {
    store
        .purge_stale(now_ms, forget_after_ms)
        .context("purging stale throttle rows")
}

/// Returns `true` if a row existed.
pub fn unban(store: &ThrottleStore, owner: OwnerIdentity) -> Result<bool> {
    store
        .remove(owner)
        .with_context(|| format!("removing throttle row for {owner}"))
}

pub fn print_records(out: &mut impl Write, views: &[RecordView], as_json: bool) -> Result<()> {
    if as_json {
        serde_json::to_writer_pretty(&mut *out, views)?;
        writeln!(out)?;
        return Ok(());
    }
    if views.is_empty() {
        writeln!(out, "no throttle records")?;
        return Ok(());
    }
    writeln!(out, "{:<10} {:>6}  {:<8} {:<32} BANNED UNTIL", "OWNER", "SCORE", "ALLOWED", "LAST PREDICTION")?;
    for v in views {
        writeln!(
            out,
            "{:<10} {:>6.2}  {:<8} {:<32} {}",
            v.owner,
            v.score,
            if v.allowed { "yes" } else { "no" },
            v.last_prerender_at.as_deref().unwrap_or("-"),
            v.banned_until.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

pub fn print_purge(out: &mut impl Write, report: PurgeReport, as_json: bool) -> Result<()> {
    if as_json {
        let value = json!({
            "stale": report.stale,
            "corrupt": report.corrupt,
            "kept": report.kept,
        });
        writeln!(out, "{value}")?;
    } else {
        writeln!(
            out,
            "removed {} stale and {} corrupt rows, kept {}",
            report.stale, report.corrupt, report.kept
        )?;
    }
    Ok(())
}
