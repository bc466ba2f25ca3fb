//! Key-value backends for persisted throttle state.
//!
//! | Backend | Use |
//! |---------|-----|
//! | `sqlite` | Durable store shared by every process of the host app |
//! | `memory` | Tests and hosts that opt out of persistence |

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use crate::errors::Result;

/// Durable string key-value store scoped to one namespace.
///
/// Implementations must be safe for concurrent use from background workers.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value under `key`.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Returns `true` if a row was removed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Delete `key` only while it still holds `expected`. Returns `true` if
    /// a row was removed; a value replaced since it was read is left alone.
    fn remove_if(&self, key: &str, expected: &str) -> Result<bool>;

    /// Every `(key, value)` pair in the namespace, ordered by key.
    fn entries(&self) -> Result<Vec<(String, String)>>;
}
