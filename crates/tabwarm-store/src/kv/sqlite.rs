//! SQLite backend — one `kv_entries` table shared by every namespace.
//!
//! Rows are keyed by `(namespace, key)`, so several throttling domains can
//! share one database file without seeing each other's rows.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use super::KeyValueStore;
use crate::errors::Result;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_entries (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);";

/// Pooled SQLite key-value store.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: Pool<SqliteConnectionManager>,
    namespace: String,
}

impl std::fmt::Debug for SqliteKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SqliteKvStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, namespace: &str, pool_size: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Self::with_pool(pool, namespace)
    }

    /// Private in-memory database. Single connection, never recycled, so the
    /// data lives as long as the store.
    pub fn open_in_memory(namespace: &str) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())?;
        Self::with_pool(pool, namespace)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>, namespace: &str) -> Result<Self> {
        pool.get()?.execute_batch(SCHEMA)?;
        tracing::debug!(namespace, "sqlite kv store ready");
        Ok(Self {
            pool,
            namespace: namespace.to_string(),
        })
    }

    /// Namespace this store is scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO kv_entries (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value,
                                                       updated_at = excluded.updated_at",
            params![self.namespace, key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
        )?;
        Ok(changed > 0)
    }

    fn remove_if(&self, key: &str, expected: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2 AND value = ?3",
            params![self.namespace, key, expected],
        )?;
        Ok(changed > 0)
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM kv_entries WHERE namespace = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![self.namespace], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
