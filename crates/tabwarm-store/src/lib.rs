//! # tabwarm-store
//!
//! The Throttle Store: durable per-identity ban state.
//!
//! - **Key-value contract**: [`kv::KeyValueStore`] — `get`/`put`/`remove`/
//!   enumerate, scoped to one private namespace per throttling domain
//! - **Backends**: [`kv::SqliteKvStore`] (rusqlite behind an r2d2 pool) and
//!   [`kv::MemoryKvStore`]
//! - **Typed access**: [`ThrottleStore`] reads and writes
//!   [`StoredThrottleRecord`]s, recovering from corrupt rows and purging
//!   stale ones
//!
//! Every call here is blocking I/O. The runtime only invokes it from its
//! background worker pool, never from the home thread.
//!
//! ## Crate Position
//!
//! Depends on: tabwarm-core. Depended on by: tabwarm-runtime, tabwarm-cli.

#![deny(unsafe_code)]

pub mod errors;
pub mod kv;
pub mod throttle_store;

pub use errors::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use throttle_store::{PurgeReport, StoredThrottleRecord, ThrottleStore};
