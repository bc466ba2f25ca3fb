//! Operator tool for the persisted prerender throttle store.
//!
//! Reads the same settings file as the service, opens its SQLite store, and
//! lists, inspects, purges, or clears per-identity ban rows.

#![deny(unsafe_code)]

mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabwarm_core::logging::init_subscriber;
use tabwarm_core::{Clock, OwnerIdentity, SystemClock};
use tabwarm_settings::{TabwarmSettings, load_settings, load_settings_from_path};
use tabwarm_store::{SqliteKvStore, ThrottleStore};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "tabwarm",
    about = "Inspect and maintain the persisted prerender throttle store"
)]
struct Args {
    /// Settings file. Defaults to `~/.tabwarm/settings.json`.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Throttle database, overriding the configured path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print JSON instead of a table.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every persisted row.
    Records,
    /// Show the row and ban state of one identity.
    Status {
        /// Owner identity (uid).
        owner: OwnerIdentity,
    },
    /// Remove rows idle past the configured horizon, plus corrupt ones.
    Purge,
    /// Reset an identity to a clean slate.
    Unban {
        /// Owner identity (uid).
        owner: OwnerIdentity,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("loading settings")?;
    let _ = init_subscriber(&settings.logging.level, settings.logging.json);

    let path = args
        .store
        .clone()
        .unwrap_or_else(|| settings.store.resolved_path());
    debug!(path = %path.display(), namespace = %settings.store.namespace, "opening throttle store");
    let kv = SqliteKvStore::open(&path, &settings.store.namespace, settings.store.pool_size)
        .with_context(|| format!("opening throttle store at {}", path.display()))?;
    let store = ThrottleStore::new(Arc::new(kv));

    let mut out = std::io::stdout().lock();
    run(&args, &settings, &store, SystemClock.now_ms(), &mut out)
}

fn run(
    args: &Args,
    settings: &TabwarmSettings,
    store: &ThrottleStore,
    now_ms: i64,
    out: &mut impl Write,
) -> Result<()> {
    match &args.command {
        Command::Records => {
            let views = commands::records(store, now_ms)?;
            commands::print_records(out, &views, args.json)
        }
        Command::Status { owner } => {
            let view = commands::status(store, *owner, now_ms)?;
            commands::print_records(out, std::slice::from_ref(&view), args.json)
        }
        Command::Purge => {
            let report = commands::purge(store, now_ms, settings.throttle.forget_after_ms)?;
            commands::print_purge(out, report, args.json)
        }
        Command::Unban { owner } => {
            if commands::unban(store, *owner)? {
                writeln!(out, "identity {owner} reset")?;
            } else {
                writeln!(out, "identity {owner} had no throttle record")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tabwarm_store::{MemoryKvStore, StoredThrottleRecord};

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_owner_and_global_flags() {
        let args = Args::try_parse_from(["tabwarm", "status", "10001", "--json"]).unwrap();
        assert!(args.json);
        match args.command {
            Command::Status { owner } => assert_eq!(owner, OwnerIdentity::new(10_001)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Args::try_parse_from(["tabwarm", "unban", "not-a-uid"]).is_err());
    }

    #[test]
    fn unban_reports_whether_a_row_existed() {
        let store = ThrottleStore::new(Arc::new(MemoryKvStore::new()));
        let owner = OwnerIdentity::new(42);
        store
            .save(
                owner,
                &StoredThrottleRecord {
                    score: 0.5,
                    last_prerender_at_ms: Some(1),
                    banned_until_ms: i64::MAX,
                },
            )
            .unwrap();
        let args = Args::try_parse_from(["tabwarm", "unban", "42"]).unwrap();
        let settings = TabwarmSettings::default();

        let mut out = Vec::new();
        run(&args, &settings, &store, 10, &mut out).unwrap();
        run(&args, &settings, &store, 10, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "identity 42 reset\nidentity 42 had no throttle record\n"
        );
    }
}
